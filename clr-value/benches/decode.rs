use clr_value::{
    decode_parameters, decode_value, encode_parameters, encode_value, ArrayValue, ClassValue,
    ElementType, SzArrayValue, Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn decode(c: &mut Criterion) {
    let name = |s| format!("decode::{s}");

    // Primitive
    let int = encode_value(&Value::Int32(42));
    c.bench_function(&name("value/int32"), |b| {
        b.iter(|| decode_value(black_box(&int)))
    });

    // String
    let string = encode_value(&Value::String(Some(
        "The quick brown fox jumps over the lazy dog".into(),
    )));
    c.bench_function(&name("value/string"), |b| {
        b.iter(|| decode_value(black_box(&string)))
    });

    // Nested class instance
    let order = Value::Class(Some(ClassValue::new(
        "Shop.Order",
        vec![
            Value::String(Some("ORD-0001".into())),
            Value::Struct(Some(ClassValue::new(
                "System.DateTime",
                vec![Value::UInt64(638_000_000_000_000_000)],
            ))),
            Value::SzArray(Some(SzArrayValue {
                element_type: ElementType::Class,
                elements: (0..16)
                    .map(|i| {
                        Value::Class(Some(ClassValue::new(
                            "Shop.Line",
                            vec![Value::Int32(i), Value::Float64(f64::from(i) * 1.5)],
                        )))
                    })
                    .collect(),
            })),
        ],
    )));
    let order = encode_value(&order);
    c.bench_function(&name("value/class"), |b| {
        b.iter(|| decode_value(black_box(&order)))
    });

    // Multi-dimensional array
    let matrix = encode_value(&Value::Array(Some(ArrayValue {
        element_type: ElementType::R8,
        lengths: vec![16, 16],
        elements: (0..256).map(|i| Value::Float64(f64::from(i))).collect(),
    })));
    c.bench_function(&name("value/matrix"), |b| {
        b.iter(|| decode_value(black_box(&matrix)))
    });

    // Typical parameter list
    let params = encode_parameters(&[
        Value::Class(Some(ClassValue::new("App.Service", vec![]))),
        Value::Int32(3),
        Value::String(Some("key".into())),
        Value::Bool(true),
    ]);
    c.bench_function(&name("parameters/typical"), |b| {
        b.iter(|| decode_parameters(black_box(&params)))
    });
}

criterion_group!(benches, decode);
criterion_main!(benches);
