//! Call-table slot interception.
//!
//! A COM vtable is shared by every instance of an interface in the process,
//! so redirecting one slot of a throwaway object's table redirects the same
//! method on the host application's real object. `SlotHook` swaps one entry
//! while keeping the original address, and puts it back on restore.
//!
//! On Windows the table lives in a read-only page of the owning module, so
//! the write is bracketed by `VirtualProtect`. The swap/restore contract
//! itself is platform-neutral and tested against a plain in-memory table.

use vrject_core::{Error, Result};

/// One patched call-table entry.
#[derive(Debug)]
pub struct SlotHook {
    entry: *mut usize,
    original: usize,
    installed: bool,
}

// The entry pointer targets a process-global vtable; which thread performs
// the swap does not matter.
unsafe impl Send for SlotHook {}

impl SlotHook {
    /// Replace `table[index]` with `replacement`, saving the original.
    ///
    /// # Safety
    /// `table` must point at a live call table with at least `index + 1`
    /// entries, and `replacement` must be a function with the exact
    /// signature and calling convention of the entry it replaces.
    pub unsafe fn install(table: *mut usize, index: usize, replacement: usize) -> Result<Self> {
        if replacement == 0 {
            return Err(Error::hook("refusing to install a null entry"));
        }
        let entry = table.add(index);
        let original = entry.read();
        write_entry(entry, replacement)?;
        Ok(Self {
            entry,
            original,
            installed: true,
        })
    }

    /// Address the slot held before installation.
    pub fn original(&self) -> usize {
        self.original
    }

    /// Put the original address back. Idempotent; a second call is a no-op.
    ///
    /// # Safety
    /// The table must still be mapped (true for the lifetime of the module
    /// that owns it).
    pub unsafe fn restore(&mut self) -> Result<()> {
        if !self.installed {
            return Ok(());
        }
        write_entry(self.entry, self.original)?;
        self.installed = false;
        Ok(())
    }
}

/// Install two slots all-or-nothing: if the second fails, the first is
/// restored before the error is returned, so no partial redirection is ever
/// left active.
///
/// # Safety
/// Same contract as [`SlotHook::install`] for both slots.
pub unsafe fn install_pair(
    table: *mut usize,
    first: (usize, usize),
    second: (usize, usize),
) -> Result<(SlotHook, SlotHook)> {
    let mut first_hook = SlotHook::install(table, first.0, first.1)?;
    match SlotHook::install(table, second.0, second.1) {
        Ok(second_hook) => Ok((first_hook, second_hook)),
        Err(err) => {
            let _ = first_hook.restore();
            Err(err)
        }
    }
}

#[cfg(windows)]
unsafe fn write_entry(entry: *mut usize, value: usize) -> Result<()> {
    use windows::Win32::System::Memory::{
        VirtualProtect, PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
    };

    let mut old_protect = PAGE_PROTECTION_FLAGS(0);
    VirtualProtect(
        entry as _,
        std::mem::size_of::<usize>(),
        PAGE_EXECUTE_READWRITE,
        &mut old_protect,
    )
    .map_err(|e| Error::hook(format!("unprotect table entry: {e:?}")))?;

    entry.write(value);

    VirtualProtect(
        entry as _,
        std::mem::size_of::<usize>(),
        old_protect,
        &mut old_protect,
    )
    .map_err(|e| Error::hook(format!("reprotect table entry: {e:?}")))?;
    Ok(())
}

#[cfg(not(windows))]
unsafe fn write_entry(entry: *mut usize, value: usize) -> Result<()> {
    entry.write(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL_PRESENT: usize = 0x1111_0000;
    const ORIGINAL_RESIZE: usize = 0x2222_0000;
    const HOOK_PRESENT: usize = 0x3333_0000;
    const HOOK_RESIZE: usize = 0x4444_0000;

    fn fake_table() -> [usize; 16] {
        let mut table = [0usize; 16];
        table[8] = ORIGINAL_PRESENT;
        table[13] = ORIGINAL_RESIZE;
        table
    }

    #[test]
    fn test_install_replaces_entries_and_captures_originals() {
        let mut table = fake_table();
        let (present, resize) = unsafe {
            install_pair(
                table.as_mut_ptr(),
                (8, HOOK_PRESENT),
                (13, HOOK_RESIZE),
            )
        }
        .unwrap();

        assert_eq!(table[8], HOOK_PRESENT);
        assert_eq!(table[13], HOOK_RESIZE);
        assert_eq!(present.original(), ORIGINAL_PRESENT);
        assert_eq!(resize.original(), ORIGINAL_RESIZE);
    }

    #[test]
    fn test_restore_puts_originals_back() {
        let mut table = fake_table();
        let (mut present, mut resize) = unsafe {
            install_pair(
                table.as_mut_ptr(),
                (8, HOOK_PRESENT),
                (13, HOOK_RESIZE),
            )
        }
        .unwrap();

        unsafe {
            present.restore().unwrap();
            resize.restore().unwrap();
        }
        assert_eq!(table[8], ORIGINAL_PRESENT);
        assert_eq!(table[13], ORIGINAL_RESIZE);
    }

    #[test]
    fn test_restore_is_idempotent() {
        let mut table = fake_table();
        let mut hook = unsafe { SlotHook::install(table.as_mut_ptr(), 8, HOOK_PRESENT) }.unwrap();

        unsafe {
            hook.restore().unwrap();
            // Overwrite the slot as a later installer would; a second
            // restore must not clobber it.
            table[8] = 0x5555_0000;
            hook.restore().unwrap();
        }
        assert_eq!(table[8], 0x5555_0000);
    }

    #[test]
    fn test_failed_second_install_rolls_back_first() {
        let mut table = fake_table();
        let result = unsafe {
            install_pair(table.as_mut_ptr(), (8, HOOK_PRESENT), (13, 0))
        };

        assert!(result.is_err());
        assert_eq!(table[8], ORIGINAL_PRESENT, "first slot must be rolled back");
        assert_eq!(table[13], ORIGINAL_RESIZE);
    }
}
