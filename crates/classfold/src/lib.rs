//! classfold: constant folding for JVM class files.
//!
//! This crate rewrites method bodies of compiled `.class` files: constant
//! arithmetic is folded, loads of locals that provably hold a constant are
//! replaced by the constant, and methods that always compute the same value
//! are collapsed to `push <value>; return`.

pub mod bytecode;
pub mod classfile;
pub mod optimizer;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use classfile::ClassFile;
pub use optimizer::{optimize_class, OptimizeOptions, OptimizeReport};

use std::fs;
use std::path::Path;

/// Optimize every method of a class.
///
/// Running it again on its own output changes nothing.
///
/// # Example
/// ```no_run
/// use classfold::{optimize, ClassFile, OptimizeOptions};
///
/// let bytes = std::fs::read("Sample.class").unwrap();
/// let class = ClassFile::parse(&bytes).unwrap();
/// let class = optimize(class, &OptimizeOptions::default()).unwrap();
/// std::fs::write("Sample.class", class.to_bytes()).unwrap();
/// ```
pub fn optimize(class: ClassFile, options: &OptimizeOptions) -> Result<ClassFile> {
    optimize_with_report(class, options).map(|(class, _)| class)
}

/// Like [`optimize`], also returning what was done.
pub fn optimize_with_report(
    class: ClassFile,
    options: &OptimizeOptions,
) -> Result<(ClassFile, OptimizeReport)> {
    let mut class = class;
    let report = optimize_class(&mut class, options)?;
    Ok((class, report))
}

/// Parse, optimize and serialize a class file held in memory.
pub fn optimize_bytes(bytes: &[u8], options: &OptimizeOptions) -> Result<Vec<u8>> {
    let class = ClassFile::parse(bytes).context("failed to parse class file")?;
    let class = optimize(class, options)?;
    Ok(class.to_bytes())
}

/// Optimize `class` and write it to `path`.
///
/// The class is serialized completely before the file is opened, so a failed
/// optimization never leaves a partial file behind.
pub fn write(class: ClassFile, path: &Path, options: &OptimizeOptions) -> Result<OptimizeReport> {
    let (class, report) = optimize_with_report(class, options)?;
    let bytes = class.to_bytes();
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(report)
}

/// Read `input`, optimize it and write the result to `output` (which may be
/// the same path).
pub fn optimize_file(
    input: &Path,
    output: &Path,
    options: &OptimizeOptions,
) -> Result<OptimizeReport> {
    let bytes = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let class = ClassFile::parse(&bytes)
        .with_context(|| format!("failed to parse class file {}", input.display()))?;
    write(class, output, options)
}
