use sha2::{Digest, Sha256};

use crate::external::CommandExecution;

const STDERR_TAIL_BYTES: usize = 2048;

/// SHA-256 of `check:{name}` + the last ≤2048 bytes of stderr, concatenated
/// for each failed check in the order given. Used by higher layers to
/// de-duplicate repeat failures across retries (spec.md §4.6).
pub fn failure_signature(failed: &[(&str, &CommandExecution)]) -> String {
    let mut hasher = Sha256::new();
    for (name, execution) in failed {
        hasher.update(b"check:");
        hasher.update(name.as_bytes());
        let stderr_bytes = execution.stderr.as_bytes();
        let start = stderr_bytes.len().saturating_sub(STDERR_TAIL_BYTES);
        hasher.update(&stderr_bytes[start..]);
    }
    hex::encode(hasher.finalize())
}
