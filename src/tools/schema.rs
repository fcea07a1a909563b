//! 工具参数 JSON Schema 生成（schemars）
//!
//! 由参数结构体派生 schema，去掉 function 参数里用不到的 $schema / title 元信息。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 为参数类型生成可直接放进 function.parameters 的 schema
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({ "type": "object", "properties": {} })
    });
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}
