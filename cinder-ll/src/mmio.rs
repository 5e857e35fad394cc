//! Memory-mapped register access primitives
//!
//! All peripheral accessors in this crate go through these helpers, which
//! are the only place volatile pointer arithmetic happens. Addresses are
//! `usize` so a block can live at a hardware base on the target or inside a
//! RAM buffer under test.

/// Read a 32-bit register.
///
/// # Safety
/// `addr` must be a valid, aligned memory-mapped register address.
#[inline(always)]
pub unsafe fn read_reg(addr: usize) -> u32 {
    core::ptr::read_volatile(addr as *const u32)
}

/// Write a 32-bit register.
///
/// # Safety
/// `addr` must be a valid, aligned memory-mapped register address.
#[inline(always)]
pub unsafe fn write_reg(addr: usize, value: u32) {
    core::ptr::write_volatile(addr as *mut u32, value);
}

/// Read-modify-write a 32-bit register.
///
/// # Safety
/// `addr` must be a valid, aligned memory-mapped register address.
#[inline(always)]
pub unsafe fn modify_reg<F>(addr: usize, f: F)
where
    F: FnOnce(u32) -> u32,
{
    write_reg(addr, f(read_reg(addr)));
}

/// Set `mask` bits in a register.
///
/// # Safety
/// `addr` must be a valid, aligned memory-mapped register address.
#[inline(always)]
pub unsafe fn set_bits(addr: usize, mask: u32) {
    modify_reg(addr, |v| v | mask);
}

/// Clear `mask` bits in a register.
///
/// # Safety
/// `addr` must be a valid, aligned memory-mapped register address.
#[inline(always)]
pub unsafe fn clear_bits(addr: usize, mask: u32) {
    modify_reg(addr, |v| v & !mask);
}

/// Replace the `mask` field of a register with `value` (pre-shifted).
///
/// # Safety
/// `addr` must be a valid, aligned memory-mapped register address and
/// `value` must fit inside `mask`.
#[inline(always)]
pub unsafe fn write_field(addr: usize, mask: u32, value: u32) {
    modify_reg(addr, |v| (v & !mask) | value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_round_trip() {
        let mut cell: u32 = 0;
        let addr = &mut cell as *mut u32 as usize;
        unsafe {
            write_reg(addr, 0xDEAD_BEEF);
            assert_eq!(read_reg(addr), 0xDEAD_BEEF);
        }
    }

    #[test]
    fn test_set_clear_bits() {
        let mut cell: u32 = 0x0F;
        let addr = &mut cell as *mut u32 as usize;
        unsafe {
            set_bits(addr, 0xF0);
            assert_eq!(read_reg(addr), 0xFF);
            clear_bits(addr, 0x0F);
            assert_eq!(read_reg(addr), 0xF0);
        }
    }

    #[test]
    fn test_write_field_preserves_other_bits() {
        let mut cell: u32 = 0xFFFF_FFFF;
        let addr = &mut cell as *mut u32 as usize;
        unsafe {
            write_field(addr, 0x0000_0F00, 0x0000_0500);
            assert_eq!(read_reg(addr), 0xFFFF_F5FF);
        }
    }
}
