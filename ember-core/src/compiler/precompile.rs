//! Precompilation: source text to a self-identifying JSON document.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::wire::{TemplateMeta, WireTemplate};
use super::{compile, CompileOptions};
use crate::error::Error;
use crate::syntax::parse_with;

/// Length of a template id in characters.
pub const ID_LENGTH: usize = 8;

/// Content hash of a template: SHA-256 over the module name (if any) and
/// the source, URL-safe base64, truncated to [`ID_LENGTH`].
pub fn template_id(source: &str, meta: Option<&TemplateMeta>) -> String {
    let mut hasher = Sha256::new();
    if let Some(name) = meta.and_then(|m| m.module_name.as_deref()) {
        hasher.update(b"moduleName:");
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(source.as_bytes());
    let mut id = URL_SAFE_NO_PAD.encode(hasher.finalize());
    id.truncate(ID_LENGTH);
    id
}

/// Parse and compile `source`.
pub fn compile_template(source: &str, options: &CompileOptions) -> Result<WireTemplate, Error> {
    let ast = parse_with(source, &options.parse)?;
    Ok(compile(&ast, options)?)
}

/// Parse, compile and serialize `source` to the precompiled JSON document.
pub fn precompile(source: &str, options: &CompileOptions) -> Result<String, Error> {
    let template = compile_template(source, options)?;
    debug!(id = %template.id, bytes = source.len(), "precompiled template");
    template.to_json()
}
