macro_rules! cbor_try_map {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Map(m) => Ok(m),
            _ => Err(WebauthnError::DataConversion(
                "expected a cbor map".to_string(),
            )),
        }
    }};
}

macro_rules! cbor_try_array {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Array(m) => Ok(m),
            _ => Err(WebauthnError::DataConversion(
                "expected a cbor array".to_string(),
            )),
        }
    }};
}

macro_rules! cbor_try_string {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Text(m) => Ok(m),
            _ => Err(WebauthnError::DataConversion(
                "expected a cbor text string".to_string(),
            )),
        }
    }};
}

macro_rules! cbor_try_bytes {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Bytes(m) => Ok(m),
            _ => Err(WebauthnError::DataConversion(
                "expected a cbor byte string".to_string(),
            )),
        }
    }};
}

macro_rules! cbor_try_i128 {
    (
        $v:expr
    ) => {{
        match $v {
            serde_cbor_2::Value::Integer(m) => Ok(*m),
            _ => Err(WebauthnError::DataConversion(
                "expected a cbor integer".to_string(),
            )),
        }
    }};
}

/// Fetch a text keyed entry from a cbor map, or fail with a bad statement error naming the
/// missing field.
macro_rules! cbor_map_field {
    (
        $m:expr, $k:expr
    ) => {{
        $m.get(&serde_cbor_2::Value::Text($k.to_string()))
            .ok_or_else(|| {
                WebauthnError::BadAttestationStatement(format!("missing field {}", $k))
            })
    }};
}
