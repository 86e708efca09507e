pub mod sim;
pub mod word;

pub use sim::{ScriptedSource, SimSource, SourceProbe};
pub use word::{RawWord, WordBlock, AMPLITUDE_MASK, NEW_EVENT_FLAG};

use parking_lot::Mutex;
use qdaq_foundation::SourceError;
use std::sync::Arc;

/// Boundary to the digitizer readout.
///
/// The acquisition core never talks to registers directly; anything that can
/// hand over tagged sample words behind these five operations can drive a
/// session — the FPGA readout in production, a simulated source in tests.
pub trait WordSource: Send {
    /// Read everything buffered since the previous pull, together with the
    /// number of words the hardware dropped in that span. A non-zero loss
    /// count means the returned words cannot be trusted for framing.
    fn pull(&mut self) -> Result<WordBlock, SourceError>;

    /// Clear the receiver and its FIFO. Part of overflow recovery.
    fn reset(&mut self) -> Result<(), SourceError>;

    /// Re-arm the receiver with a new event geometry.
    fn reconfigure(&mut self, sample_count: usize, sample_delay: usize) -> Result<(), SourceError>;

    fn set_threshold(&mut self, threshold: u16) -> Result<(), SourceError>;

    fn select_channel(&mut self, channel: u8) -> Result<(), SourceError>;
}

/// A source shared between the controller and the acquisition worker.
pub type SharedWordSource = Arc<Mutex<dyn WordSource>>;

pub fn shared(source: impl WordSource + 'static) -> SharedWordSource {
    Arc::new(Mutex::new(source))
}
