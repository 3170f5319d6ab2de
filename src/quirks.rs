/// # Quirks
/// CHIP-8 interpreters disagree on a handful of instructions and some ROMs
/// only run correctly under one reading. The default matches the behavior
/// most modern test ROMs expect.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Quirks {
    /// 8XY6 / 8XYE shift Vy and store the result in Vx, rather than shifting Vx in place
    pub shift_reads_vy: bool,
}

impl Quirks {
    /// The original COSMAC VIP interpreter
    pub fn cosmac_vip() -> Self {
        Quirks {
            shift_reads_vy: true,
        }
    }
}
