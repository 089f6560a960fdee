//! Injected presentation hook.
//!
//! Built as a cdylib and loaded into a D3D11 host process by the launcher.
//! On attach it spawns a bootstrap thread that loads configuration and
//! patches the swap-chain vtable; every hosted Present then re-renders the
//! frame through the VR runtime and converts head yaw into mouse motion.

pub mod vtable;

#[cfg(target_os = "windows")]
mod compositor;
#[cfg(target_os = "windows")]
mod hooks;
#[cfg(target_os = "windows")]
mod input;
#[cfg(target_os = "windows")]
mod xr;

#[cfg(target_os = "windows")]
pub use hooks::{configure, install, uninstall};

#[cfg(not(target_os = "windows"))]
pub fn configure(_config: &vrject_core::Config) {}

#[cfg(not(target_os = "windows"))]
pub fn install() -> vrject_core::Result<()> {
    Err(vrject_core::Error::unsupported(
        "swap-chain hooking requires Windows",
    ))
}

#[cfg(not(target_os = "windows"))]
pub fn uninstall() {}

/// Name of the configuration file, looked up in the host's working
/// directory.
pub const CONFIG_FILE: &str = "vrject.json";

#[cfg(target_os = "windows")]
mod entry {
    use tracing::{error, info, warn};
    use vrject_core::Config;

    use windows::core::BOOL;
    use windows::Win32::Foundation::HMODULE;
    use windows::Win32::System::Console::AllocConsole;
    use windows::Win32::System::LibraryLoader::DisableThreadLibraryCalls;
    use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    fn bootstrap() {
        // Hosts are usually GUI subsystem processes with no console; give
        // the log output somewhere to go.
        unsafe {
            let _ = AllocConsole();
        }
        vrject_core::init_tracing();

        let config = match Config::load(super::CONFIG_FILE) {
            Ok(config) => config,
            Err(err) => {
                warn!("configuration unreadable, using defaults: {err}");
                Config::default()
            }
        };
        if !config.enabled {
            info!("disabled by configuration, leaving host untouched");
            return;
        }

        super::configure(&config);
        match super::install() {
            Ok(()) => info!("presentation hook active"),
            Err(err) => error!("hook installation failed: {err}"),
        }
    }

    #[no_mangle]
    extern "system" fn DllMain(
        module: HMODULE,
        reason: u32,
        _reserved: *mut std::ffi::c_void,
    ) -> BOOL {
        match reason {
            DLL_PROCESS_ATTACH => {
                unsafe {
                    let _ = DisableThreadLibraryCalls(module);
                }
                // Loader lock is held here; do the real work elsewhere.
                std::thread::spawn(bootstrap);
            }
            DLL_PROCESS_DETACH => {
                super::uninstall();
            }
            _ => {}
        }
        BOOL::from(true)
    }
}
