//! Launches a D3D11 application with the presentation hook injected.
//!
//! The target is started suspended, the hook DLL's path is written into its
//! address space, and a remote thread runs `LoadLibraryA` over it before the
//! process is resumed. The DLL's own attach logic does the rest.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "vrject", about = "Run a D3D11 application under the VR presentation hook")]
struct Args {
    /// Executable to launch.
    exe: PathBuf,

    /// Hook DLL to inject; defaults to vrject_hook.dll next to the target.
    #[arg(short, long)]
    dll: Option<PathBuf>,
}

fn main() -> Result<()> {
    vrject_core::init_tracing();
    let args = Args::parse();

    let exe = args
        .exe
        .canonicalize()
        .with_context(|| format!("resolving target executable {}", args.exe.display()))?;
    let dll = match args.dll {
        Some(dll) => dll,
        None => exe
            .parent()
            .map(|dir| dir.join("vrject_hook.dll"))
            .context("target executable has no parent directory")?,
    };
    let dll = dll
        .canonicalize()
        .with_context(|| format!("resolving hook DLL {}", dll.display()))?;

    info!(exe = %exe.display(), dll = %dll.display(), "launching with injection");
    run(&exe, &dll)
}

#[cfg(target_os = "windows")]
fn run(exe: &std::path::Path, dll: &std::path::Path) -> Result<()> {
    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;

    use windows::core::{s, PWSTR};
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
    use windows::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};
    use windows::Win32::System::Memory::{
        VirtualAllocEx, VirtualFreeEx, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_READWRITE,
    };
    use windows::Win32::System::Threading::{
        CreateProcessW, CreateRemoteThread, ResumeThread, TerminateProcess, WaitForSingleObject,
        CREATE_SUSPENDED, INFINITE, LPTHREAD_START_ROUTINE, PROCESS_INFORMATION, STARTUPINFOW,
    };

    // LoadLibraryA takes a narrow string; the path crosses the process
    // boundary as bytes.
    let dll_bytes = {
        let text = dll.to_str().context("hook DLL path is not valid UTF-8")?;
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        bytes
    };

    let mut command_line: Vec<u16> = std::ffi::OsStr::new(&format!("\"{}\"", exe.display()))
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let mut process = PROCESS_INFORMATION::default();
    unsafe {
        CreateProcessW(
            None,
            Some(PWSTR(command_line.as_mut_ptr())),
            None,
            None,
            false,
            CREATE_SUSPENDED,
            None,
            None,
            &startup,
            &mut process,
        )
    }
    .with_context(|| format!("starting {}", exe.display()))?;

    let inject = || -> Result<()> {
        let kernel32 = unsafe { GetModuleHandleA(s!("kernel32.dll")) }
            .context("locating kernel32")?;
        let load_library = unsafe { GetProcAddress(kernel32, s!("LoadLibraryA")) }
            .context("locating LoadLibraryA")?;

        let remote = unsafe {
            VirtualAllocEx(
                process.hProcess,
                None,
                dll_bytes.len(),
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        if remote.is_null() {
            bail!("allocating path buffer in target");
        }

        let result = (|| -> Result<()> {
            unsafe {
                WriteProcessMemory(
                    process.hProcess,
                    remote,
                    dll_bytes.as_ptr() as *const c_void,
                    dll_bytes.len(),
                    None,
                )
            }
            .context("writing DLL path into target")?;

            let start: LPTHREAD_START_ROUTINE =
                unsafe { std::mem::transmute(load_library as usize) };
            let thread = unsafe {
                CreateRemoteThread(
                    process.hProcess,
                    None,
                    0,
                    start,
                    Some(remote.cast_const()),
                    0,
                    None,
                )
            }
            .context("starting loader thread in target")?;
            unsafe {
                WaitForSingleObject(thread, INFINITE);
                let _ = CloseHandle(thread);
            }
            Ok(())
        })();

        unsafe {
            let _ = VirtualFreeEx(process.hProcess, remote, 0, MEM_RELEASE);
        }
        result
    };

    match inject() {
        Ok(()) => {
            info!("hook injected, resuming target");
            unsafe { ResumeThread(process.hThread) };
        }
        Err(err) => {
            unsafe {
                let _ = TerminateProcess(process.hProcess, 1);
                let _ = CloseHandle(process.hThread);
                let _ = CloseHandle(process.hProcess);
            }
            return Err(err);
        }
    }

    unsafe {
        WaitForSingleObject(process.hProcess, INFINITE);
        let _ = CloseHandle(process.hThread);
        let _ = CloseHandle(process.hProcess);
    }
    info!("target exited");
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn run(_exe: &std::path::Path, _dll: &std::path::Path) -> Result<()> {
    bail!("process injection requires Windows")
}
