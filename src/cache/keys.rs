//! Cache key construction.
//!
//! Keys look like `{prefix}:{sha256 of the arguments}`. Data bound to a class
//! or a teacher carries the owner in the prefix (`report_daily_summary:class7`)
//! so a write can drop exactly that owner's entries with a substring match.

use std::fmt::Display;

use sha2::{Digest, Sha256};

/// Builds a stable key from a semantic prefix and ordered arguments.
///
/// Each argument is length-prefixed before hashing so `("a|b", "c")` and
/// `("a", "b|c")` never collide.
pub fn cache_key(prefix: &str, args: &[&dyn Display]) -> String {
    let mut hasher = Sha256::new();
    for arg in args {
        let rendered = arg.to_string();
        hasher.update((rendered.len() as u64).to_le_bytes());
        hasher.update(rendered.as_bytes());
    }
    format!("{prefix}:{}", hex::encode(hasher.finalize()))
}

pub fn class_prefix(kind: &str, class_id: i64) -> String {
    format!("{kind}:class{class_id}")
}

/// Substring matching every key built from [`class_prefix`] for this class.
pub fn class_pattern(class_id: i64) -> String {
    format!(":class{class_id}:")
}

pub fn teacher_prefix(kind: &str, teacher_id: i64) -> String {
    format!("{kind}:teacher{teacher_id}")
}

pub fn teacher_pattern(teacher_id: i64) -> String {
    format!(":teacher{teacher_id}:")
}
