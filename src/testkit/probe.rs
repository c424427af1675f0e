//! Mock [`ResourceProbe`] implementations.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::domain::ResourceReading;
use crate::error::ProbeError;
use crate::port::ResourceProbe;

/// Probe returning a settable reading and counting calls.
pub struct FixedProbe {
    reading: Mutex<ResourceReading>,
    reads: AtomicU32,
}

impl FixedProbe {
    pub fn new(memory_percent: f64, cpu_percent: f64) -> Self {
        Self {
            reading: Mutex::new(ResourceReading {
                memory_percent,
                cpu_percent,
            }),
            reads: AtomicU32::new(0),
        }
    }

    pub fn set(&self, memory_percent: f64, cpu_percent: f64) {
        *self.reading.lock() = ResourceReading {
            memory_percent,
            cpu_percent,
        };
    }

    /// How many times `read()` was called.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ResourceProbe for FixedProbe {
    fn read(&self) -> Result<ResourceReading, ProbeError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.reading.lock())
    }
}

/// Probe that always fails.
pub struct FailingProbe;

impl ResourceProbe for FailingProbe {
    fn read(&self) -> Result<ResourceReading, ProbeError> {
        Err(ProbeError::Unavailable("probe offline".to_string()))
    }
}
