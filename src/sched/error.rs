use super::types::CpuId;

/// Recoverable scheduler API errors.
///
/// Ready-queue overflow is not in here: it is a configuration error and
/// halts the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// CPU index outside the configured range.
    InvalidCpu(CpuId),
    /// Secondary CPU brought up before the boot CPU.
    BootOrder(CpuId),
    AlreadyOnline(CpuId),
    NotOnline(CpuId),
    /// The boot CPU cannot be taken offline.
    BootCpuOffline,
    /// Target CPU's request mailbox is full.
    MailboxFull,
    /// Handle does not name a context bound to this CPU.
    UnknownContext,
    /// Configuration rejected by validation.
    InvalidConfig(&'static str),
}

impl SchedError {
    pub const fn as_str(self) -> &'static str {
        match self {
            SchedError::InvalidCpu(_) => "invalid cpu",
            SchedError::BootOrder(_) => "boot cpu must come online first",
            SchedError::AlreadyOnline(_) => "cpu already online",
            SchedError::NotOnline(_) => "cpu not online",
            SchedError::BootCpuOffline => "boot cpu cannot go offline",
            SchedError::MailboxFull => "request mailbox full",
            SchedError::UnknownContext => "unknown scheduling context",
            SchedError::InvalidConfig(reason) => reason,
        }
    }
}

impl core::fmt::Display for SchedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SchedError::InvalidCpu(cpu)
            | SchedError::BootOrder(cpu)
            | SchedError::AlreadyOnline(cpu)
            | SchedError::NotOnline(cpu) => write!(f, "{}: {}", cpu, self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}
