//! Embedding normalization and similarity helpers.
//!
//! Every provider adapter runs vectors through [`prepare_vector`] before an
//! upsert or a query, so a malformed embedding is rejected with a
//! `Validation` error before any network or disk I/O happens.
//!
//! [`coerce_embedding`] handles the looser case of numeric-array-like JSON
//! coming back from a backend or an older file: plain arrays, typed-buffer
//! objects keyed `"0"`, `"1"`, ..., `{"data": [...]}` wrappers and numeric
//! strings all become a plain `Vec<f32>`.

use canopy_core::{Error, Result};
use serde_json::Value;

/// Validate a vector and return a plain owned copy.
///
/// Rejects empty vectors and any non-finite element.
pub fn prepare_vector(vector: &[f32]) -> Result<Vec<f32>> {
    if vector.is_empty() {
        return Err(Error::validation("vector must not be empty"));
    }
    if let Some((index, value)) = vector.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(Error::validation(format!(
            "vector contains non-finite value {value} at index {index}"
        )));
    }
    Ok(vector.to_vec())
}

/// Validate a vector against an expected dimension.
///
/// Never truncates or pads: a length mismatch is a `Validation` error.
pub fn prepare_vector_with_dimension(vector: &[f32], expected: usize) -> Result<Vec<f32>> {
    if vector.len() != expected {
        return Err(Error::validation(format!(
            "vector dimension {} does not match expected {expected}",
            vector.len()
        )));
    }
    prepare_vector(vector)
}

/// Coerce a numeric-array-like JSON value into a plain vector of finite floats.
pub fn coerce_embedding(value: &Value) -> Result<Vec<f32>> {
    let raw = match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| coerce_number(v, i))
            .collect::<Result<Vec<f32>>>()?,
        Value::Object(map) => {
            if let Some(inner) = map.get("data").or_else(|| map.get("values")) {
                return coerce_embedding(inner);
            }
            coerce_indexed_object(map)?
        }
        other => {
            return Err(Error::validation(format!(
                "cannot coerce {} into an embedding",
                json_kind(other)
            )));
        }
    };
    prepare_vector(&raw)
}

fn coerce_indexed_object(map: &serde_json::Map<String, Value>) -> Result<Vec<f32>> {
    let mut indexed = Vec::with_capacity(map.len());
    for (key, value) in map {
        let index: usize = key.parse().map_err(|_| {
            Error::validation(format!("embedding object has non-index key '{key}'"))
        })?;
        indexed.push((index, value));
    }
    indexed.sort_by_key(|(i, _)| *i);

    let mut out = Vec::with_capacity(indexed.len());
    for (expected, (index, value)) in indexed.into_iter().enumerate() {
        if index != expected {
            return Err(Error::validation(format!(
                "embedding object is missing index {expected}"
            )));
        }
        out.push(coerce_number(value, index)?);
    }
    Ok(out)
}

fn coerce_number(value: &Value, index: usize) -> Result<f32> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        Error::validation(format!(
            "embedding element {index} is not numeric ({})",
            json_kind(value)
        ))
    })?;

    let f = n as f32;
    if !f.is_finite() {
        return Err(Error::validation(format!(
            "embedding element {index} is not a finite f32 ({n})"
        )));
    }
    Ok(f)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Clamp a raw similarity into the `[0, 1]` contract.
pub fn clamp_similarity(similarity: f32) -> f32 {
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}

/// Convert a cosine distance (`1 - cos`) into a `[0, 1]` similarity.
pub fn similarity_from_cosine_distance(distance: f32) -> f32 {
    clamp_similarity(1.0 - distance)
}
