//! Runtime abstraction for system operations.
//!
//! This module provides a trait-based abstraction over system operations,
//! enabling dependency injection and testability.
//!
//! # Structure
//!
//! - `env` - Environment variables and well-known directories
//! - `fs` - File system operations (read, write, atomic write, permissions)
//! - `lock` - Cross-process advisory file locks
//! - `process` - Spawning external tools

mod env;
mod fs;
mod lock;
mod process;

use anyhow::Result;
use std::env as std_env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

pub use lock::FileLock;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    /// Set a process-wide environment variable.
    fn set_env_var(&self, key: &str, value: &OsStr) -> Result<()>;

    // File System
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Write `contents` to a uniquely named file next to `path`, then rename it
    /// into place. Readers never observe a partially written file.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn is_executable(&self, path: &Path) -> bool;
    fn file_len(&self, path: &Path) -> Result<u64>;
    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>>;
    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>>;

    /// Set file permissions (mode) on Unix systems. No-op on Windows.
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;

    /// Take an exclusive advisory lock on `path`, creating the file if needed.
    /// Blocks until the lock is available; released when the guard drops.
    fn lock_exclusive(&self, path: &Path) -> Result<FileLock>;

    // Processes
    /// Run `program` to completion, failing on a non-zero exit status.
    fn run_command(&self, program: &Path, args: &[OsString]) -> Result<()>;

    // Directories
    fn cache_dir(&self) -> Option<PathBuf>;
    fn temp_dir(&self) -> PathBuf;
    fn current_exe(&self) -> Result<PathBuf>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn set_env_var(&self, key: &str, value: &OsStr) -> Result<()> {
        self.set_env_var_impl(key, value)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.read_impl(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_impl(path, contents)
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.write_atomic_impl(path, contents)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.rename_impl(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.create_dir_all_impl(path)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.remove_file_impl(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.remove_dir_all_impl(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.exists_impl(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.is_dir_impl(path)
    }

    fn is_executable(&self, path: &Path) -> bool {
        self.is_executable_impl(path)
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        self.file_len_impl(path)
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        self.create_file_impl(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn std::io::Read + Send>> {
        self.open_impl(path)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.set_permissions_impl(path, mode)
    }

    fn lock_exclusive(&self, path: &Path) -> Result<FileLock> {
        self.lock_exclusive_impl(path)
    }

    fn run_command(&self, program: &Path, args: &[OsString]) -> Result<()> {
        self.run_command_impl(program, args)
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir_impl()
    }

    fn temp_dir(&self) -> PathBuf {
        self.temp_dir_impl()
    }

    fn current_exe(&self) -> Result<PathBuf> {
        self.current_exe_impl()
    }
}
