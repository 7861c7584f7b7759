//! Property tests: filter and serialization round-trips

use pdfdelta::parser::filters::{
    decode_ascii85, decode_ascii_hex, decode_flate, decode_run_length, encode_ascii85,
    encode_ascii_hex, encode_flate, encode_run_length,
};
use pdfdelta::parser::Lexer;
use pdfdelta::{serialize_object, PdfArray, PdfDictionary, PdfName, PdfObject, PdfString};
use proptest::prelude::*;

proptest! {
    #[test]
    fn flate_round_trips(data: Vec<u8>) {
        let encoded = encode_flate(&data);
        prop_assert_eq!(decode_flate(&encoded).unwrap(), data);
    }

    #[test]
    fn ascii_hex_round_trips(data: Vec<u8>) {
        let encoded = encode_ascii_hex(&data);
        prop_assert_eq!(decode_ascii_hex(&encoded).unwrap(), data);
    }

    #[test]
    fn ascii85_round_trips(data: Vec<u8>) {
        let encoded = encode_ascii85(&data);
        prop_assert_eq!(decode_ascii85(&encoded).unwrap(), data);
    }

    #[test]
    fn run_length_round_trips(data: Vec<u8>) {
        let encoded = encode_run_length(&data);
        prop_assert_eq!(decode_run_length(&encoded).unwrap(), data);
    }

    #[test]
    fn serialized_objects_reparse_equal(obj in pdf_object_strategy()) {
        let bytes = serialize_object(&obj);
        let mut lexer = Lexer::new(&bytes);
        let reparsed = PdfObject::parse(&mut lexer).unwrap();
        prop_assert_eq!(reparsed, obj);
    }
}

/// Names stay within bytes the escaper round-trips losslessly
fn name_strategy() -> impl Strategy<Value = PdfName> {
    proptest::string::string_regex("[A-Za-z0-9 #._-]{1,12}")
        .unwrap()
        .prop_map(|name| PdfName::new(name))
}

/// Reals limited to three decimals so six-digit formatting is lossless
fn real_strategy() -> impl Strategy<Value = f64> {
    (-1_000_000_000i64..1_000_000_000i64).prop_map(|mantissa| mantissa as f64 / 1000.0)
}

fn pdf_object_strategy() -> impl Strategy<Value = PdfObject> {
    let leaf = prop_oneof![
        Just(PdfObject::Null),
        any::<bool>().prop_map(PdfObject::Boolean),
        any::<i64>().prop_map(PdfObject::Integer),
        real_strategy().prop_map(PdfObject::Real),
        any::<Vec<u8>>().prop_map(|bytes| PdfObject::String(PdfString::new(bytes))),
        name_strategy().prop_map(PdfObject::Name),
        (0u32..100_000, 0u16..100)
            .prop_map(|(num, gen)| PdfObject::Reference(num, gen)),
    ];

    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6)
                .prop_map(|elements| PdfObject::Array(PdfArray(elements))),
            proptest::collection::vec((name_strategy(), inner), 0..6).prop_map(|entries| {
                let mut dict = PdfDictionary::new();
                for (key, value) in entries {
                    dict.0.insert(key, value);
                }
                PdfObject::Dictionary(dict)
            }),
        ]
    })
}
