//! File naming for tables and logs
//!
//! ```text
//! {db}/L{level}/{number:06}.ldb    current table layout
//! {db}/{number:06}.sst             legacy flat layout (read fallback)
//! {db}/{number:06}.log             durability log
//! ```

use std::path::{Path, PathBuf};

pub fn table_file_name(db: &Path, number: u64, level: u32) -> PathBuf {
    db.join(format!("L{}", level)).join(format!("{:06}.ldb", number))
}

pub fn legacy_table_file_name(db: &Path, number: u64) -> PathBuf {
    db.join(format!("{:06}.sst", number))
}

pub fn log_file_name(db: &Path, number: u64) -> PathBuf {
    db.join(format!("{:06}.log", number))
}

/// "000042.ldb" or "000042.sst" -> Some(42)
pub fn parse_table_file_name(path: &Path) -> Option<u64> {
    let ext = path.extension()?.to_str()?;
    if ext != "ldb" && ext != "sst" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
