use crate::bio::ReqFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Don't wait for anything.
    #[default]
    None,
    /// Someone waits for the write to finish.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoClass {
    #[default]
    None,
    RealTime,
    BestEffort,
    Idle,
}

const IOPRIO_CLASS_SHIFT: u16 = 13;
const IOPRIO_PRIO_MASK: u16 = (1 << IOPRIO_CLASS_SHIFT) - 1;

/// How the caller wants a page written back.
#[derive(Debug, Clone, Copy, Default)]
pub struct WritebackControl {
    pub sync_mode: SyncMode,
    pub for_background: bool,
    pub for_reclaim: bool,
    pub io_class: IoClass,
    /// Priority inside `io_class`, 0 is the highest.
    pub io_prio: u16,
    /// Control group to charge the I/O to.
    pub cgroup: Option<u32>,
}

impl WritebackControl {
    pub fn for_reclaim() -> Self {
        Self {
            for_reclaim: true,
            ..Default::default()
        }
    }

    pub fn sync() -> Self {
        Self {
            sync_mode: SyncMode::All,
            ..Default::default()
        }
    }

    pub fn write_flags(&self) -> ReqFlags {
        let mut flags = ReqFlags::empty();

        if self.sync_mode == SyncMode::All {
            flags |= ReqFlags::SYNC;
        } else if self.for_background {
            flags |= ReqFlags::BACKGROUND;
        }

        flags
    }

    /// Packed I/O priority: class in the top bits, level below.
    pub fn ioprio(&self) -> u16 {
        ((self.io_class as u16) << IOPRIO_CLASS_SHIFT) | (self.io_prio & IOPRIO_PRIO_MASK)
    }
}
