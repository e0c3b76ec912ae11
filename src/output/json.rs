use serde_json::{json, Value};

use crate::error::TaskhubError;

pub fn success(data: Value) -> Value {
    json!({
        "success": true,
        "data": data
    })
}

pub fn success_with_message(message: &str, data: Value) -> Value {
    json!({
        "success": true,
        "message": message,
        "data": data
    })
}

/// A page of records with the total before paging.
pub fn page(data: Vec<Value>, total: u64, skip: u32, limit: u32) -> Value {
    let count = data.len() as u64;
    json!({
        "success": true,
        "count": count,
        "total": total,
        "pagination": {
            "skip": skip,
            "limit": limit,
            "hasMore": u64::from(skip) + count < total
        },
        "data": data
    })
}

pub fn count_only(count: u64) -> Value {
    json!({
        "success": true,
        "data": count
    })
}

pub fn error(err: &TaskhubError) -> Value {
    let mut body = json!({
        "success": false,
        "message": err.message,
        "code": err.code.as_str()
    });
    if !err.errors.is_empty() {
        body["errors"] = json!(err.errors);
    }
    body
}
