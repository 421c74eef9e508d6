//! A code object stored together with the recorded parse trees of it and
//! everything nested in it, so a render can be replayed without a grammar.

use crate::error::Result;
use crate::lang::{CodeObject, Node};
use crate::parse::ReplayParser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bundle {
    pub code: CodeObject,
    /// Parse trees keyed by code-object qualified name.
    pub trees: BTreeMap<String, Node>,
}

impl Bundle {
    pub fn new(code: CodeObject) -> Self {
        Self {
            code,
            trees: BTreeMap::new(),
        }
    }

    pub fn with_tree(mut self, key: impl Into<String>, tree: Node) -> Self {
        self.trees.insert(key.into(), tree);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let bundle = Self::from_bytes(&bytes)?;
        debug!(path = %path.display(), trees = bundle.trees.len(), "bundle loaded");
        Ok(bundle)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// A parser that serves the recorded trees.
    pub fn parser(&self) -> ReplayParser {
        ReplayParser::new(self.trees.clone())
    }

    /// Every code object in the bundle, depth first.
    pub fn code_objects(&self) -> Vec<&CodeObject> {
        let mut out = Vec::new();
        let mut stack = vec![&self.code];
        while let Some(code) = stack.pop() {
            out.push(code);
            let mut nested: Vec<&CodeObject> = code.nested().collect();
            nested.reverse();
            stack.extend(nested);
        }
        out
    }
}
