//! Premain entry points.
//!
//! The host runtime calls one of these before its own `main`. Agent
//! arguments follow the usual `key=value,key=value` convention; a bare
//! value is taken as the driver name.
//!
//! ```text
//! zink
//! driver=d3d12
//! driver=zink,arch=x64
//! ```

use log::{info, warn};
use std::ffi::{CStr, c_char, c_int};
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::LoadResult;
use crate::loader::{ResolvedLibrary, global};
use crate::variant::DriverKind;

/// Returned by [`mesa_loader_premain`] when resolution panicked.
pub const PANIC_CODE: c_int = 70;

const LOG_ENV: &str = "MESA_LOADER_LOG";

#[derive(Debug, Default, PartialEq)]
pub struct AgentArgs {
    pub driver: Option<DriverKind>,
    /// Architecture override, same as `MESA_LOADER_ARCH`.
    pub arch: Option<String>,
}

impl AgentArgs {
    /// Parse an agent argument string. Unknown keys and invalid driver names
    /// are reported and ignored; the host should still start.
    pub fn parse(args: &str) -> Self {
        let mut parsed = AgentArgs::default();

        for item in args.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = match item.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => ("driver", item),
            };

            match key {
                "driver" => match value.parse() {
                    Ok(driver) => parsed.driver = Some(driver),
                    Err(e) => warn!("Ignoring agent argument: {}", e),
                },
                "arch" if !value.is_empty() => parsed.arch = Some(value.to_string()),
                other => warn!("Ignoring unknown agent argument {:?}", other),
            }
        }

        parsed
    }
}

/// Rust entry point for hosts that can call into the crate directly.
pub fn premain(agent_args: Option<&str>) -> LoadResult<ResolvedLibrary> {
    init_logging();
    let args = agent_args.map(AgentArgs::parse).unwrap_or_default();
    let library = match &args.arch {
        Some(arch) => global::initialize_for_arch(args.driver, arch)?,
        None => global::initialize(args.driver)?,
    };
    info!("Mesa loader ready: {}", library.variant);
    Ok(library)
}

/// C ABI entry point.
///
/// Returns 0 on success or the non-zero [`LoadError::code`] of the failure.
/// Never unwinds into the caller.
///
/// # Safety
///
/// `args` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
///
/// [`LoadError::code`]: crate::error::LoadError::code
#[unsafe(no_mangle)]
pub unsafe extern "C" fn mesa_loader_premain(args: *const c_char) -> c_int {
    let args = if args.is_null() {
        None
    } else {
        // SAFETY: non-null and NUL-terminated per the function contract.
        Some(unsafe { CStr::from_ptr(args) }.to_string_lossy().into_owned())
    };

    match catch_unwind(AssertUnwindSafe(|| premain(args.as_deref()))) {
        Ok(Ok(_)) => 0,
        Ok(Err(e)) => {
            warn!("Mesa loader failed, falling back to the system OpenGL: {}", e);
            e.code()
        }
        Err(_) => PANIC_CODE,
    }
}

// Hosts rarely configure a logger before premain runs.
fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "warn"))
        .try_init();
}
