//! Serialized method input
//!
//! Bytecode decoding happens elsewhere; methods arrive as JSON documents of
//! blocks, instructions, variables and try blocks. A [`RawMethod`] is kept by the
//! loaded method so it can be rebuilt from scratch.

use serde::{Deserialize, Serialize};

use super::insn::{InsnKind, InsnPayload, Literal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMethod {
    pub name: String,
    /// SSA variables, referenced by index from instructions
    #[serde(default)]
    pub vars: Vec<RawVar>,
    /// Blocks, referenced by index; block 0 is the entry
    pub blocks: Vec<RawBlock>,
    #[serde(default)]
    pub try_blocks: Vec<RawTryBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVar {
    pub reg: u16,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    /// Explicit code variable; variables without one get their own
    #[serde(default)]
    pub code_var: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(default)]
    pub insns: Vec<RawInsn>,
    /// Normal successors
    #[serde(default)]
    pub succ: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInsn {
    pub op: InsnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<InsnPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<RawArg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawArg {
    Var(u32),
    Lit(Literal),
    Insn(Box<RawInsn>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTryBlock {
    /// Blocks covered by the try
    pub blocks: Vec<usize>,
    pub handlers: Vec<RawHandler>,
    /// Index of the enclosing try block
    #[serde(default)]
    pub outer: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHandler {
    pub block: usize,
    /// Empty means catch-all
    #[serde(default)]
    pub catch_types: Vec<String>,
}

impl RawMethod {
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse either a single method or an array of methods
    pub fn list_from_json(text: &str) -> crate::Result<Vec<Self>> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.is_array() {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(vec![serde_json::from_value(value)?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_method() {
        let text = r#"{
            "name": "Foo.run()V",
            "vars": [{"reg": 0, "name": "e"}],
            "blocks": [
                {"insns": [{"op": "invoke", "payload": {"method": "a()V"}}], "succ": [1]},
                {"insns": [{"op": "return"}]},
                {"insns": [{"op": "move_exception", "result": 0}, {"op": "throw", "args": [{"var": 0}]}]}
            ],
            "try_blocks": [{"blocks": [0], "handlers": [{"block": 2}]}]
        }"#;
        let method = RawMethod::from_json(text).unwrap();
        assert_eq!(method.blocks.len(), 3);
        assert_eq!(method.try_blocks[0].handlers[0].catch_types.len(), 0);
        assert!(matches!(method.blocks[2].insns[1].args[0], RawArg::Var(0)));
    }

    #[test]
    fn test_list_accepts_single_object() {
        let text = r#"{"name": "m", "blocks": [{"insns": [{"op": "return"}]}]}"#;
        assert_eq!(RawMethod::list_from_json(text).unwrap().len(), 1);
        let text = format!("[{}, {}]", text, text);
        assert_eq!(RawMethod::list_from_json(&text).unwrap().len(), 2);
    }
}
