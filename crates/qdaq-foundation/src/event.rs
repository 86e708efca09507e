/// One reconstructed pulse: a fixed-length run of amplitude samples.
///
/// The frame splitter only emits records whose length matches the configured
/// sample count; downstream sinks may rely on that but still validate
/// defensively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    samples: Vec<u32>,
}

impl EventRecord {
    pub fn new(samples: Vec<u32>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[u32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<u32> {
        self.samples
    }
}

impl From<Vec<u32>> for EventRecord {
    fn from(samples: Vec<u32>) -> Self {
        Self::new(samples)
    }
}
