//! End-to-end ABI checks.

mod archive;
mod compat;
mod elf_samples;
mod properties;
mod suppression;
