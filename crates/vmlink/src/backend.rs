//! Native library backend: the entry point table plus, when loaded
//! dynamically, the library that keeps those entry points mapped.

use std::fmt;
use std::sync::Arc;

use vmlink_abi::{NativeApi, ABI_VERSION};

use crate::error::{Error, Result};

/// Environment variable naming a native library for [`Backend::from_env`].
pub const NATIVE_LIB_ENV: &str = "VMLINK_NATIVE_LIB";

pub struct Backend {
    api: NativeApi,
    #[cfg(feature = "dylib")]
    _lib: Option<libloading::Library>,
}

impl Backend {
    /// Use a statically linked entry point table.
    pub fn from_api(api: NativeApi) -> Result<Arc<Self>> {
        check_version(&api)?;
        Ok(Arc::new(Backend {
            api,
            #[cfg(feature = "dylib")]
            _lib: None,
        }))
    }

    /// Load a native library and fetch its entry point table.
    #[cfg(feature = "dylib")]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Arc<Self>> {
        use libloading::{Library, Symbol};
        use vmlink_abi::{GetApiFn, GET_API_SYMBOL};

        let path = path.as_ref();
        #[cfg(unix)]
        let lib = unsafe {
            let flags = libloading::os::unix::RTLD_NOW | libloading::os::unix::RTLD_GLOBAL;
            libloading::os::unix::Library::open(Some(path), flags)
                .map(Library::from)
                .map_err(|e| Error::Load(e.to_string()))?
        };
        #[cfg(not(unix))]
        let lib = unsafe { Library::new(path).map_err(|e| Error::Load(e.to_string()))? };

        let api = unsafe {
            let get_api: Symbol<GetApiFn> = lib.get(GET_API_SYMBOL).map_err(|_| {
                Error::Load(format!("{} does not export vmlink_get_api", path.display()))
            })?;
            get_api()
        };
        check_version(&api)?;
        log::debug!("loaded native library {}", path.display());

        Ok(Arc::new(Backend {
            api,
            _lib: Some(lib),
        }))
    }

    /// Load the library named by `VMLINK_NATIVE_LIB`.
    #[cfg(feature = "dylib")]
    pub fn from_env() -> Result<Arc<Self>> {
        let path = std::env::var_os(NATIVE_LIB_ENV)
            .ok_or_else(|| Error::Load(format!("{} is not set", NATIVE_LIB_ENV)))?;
        Self::open(path)
    }

    #[inline]
    pub fn api(&self) -> &NativeApi {
        &self.api
    }
}

fn check_version(api: &NativeApi) -> Result<()> {
    if api.version != ABI_VERSION {
        return Err(Error::AbiMismatch {
            expected: ABI_VERSION,
            found: api.version,
        });
    }
    Ok(())
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("version", &self.api.version)
            .finish()
    }
}
