//! Audio side of the voice pipeline.
//!
//! One duplex peripheral is shared between capture and playback. The
//! [`AudioDuplexController`] hands out exclusive tokens for each direction;
//! the [`Recorder`] fills a fixed [`PcmBuffer`] through a capture token and
//! the [`Player`] streams bytes through a playback token.

pub mod driver;
pub mod duplex;
#[cfg(feature = "cpal-audio")]
pub mod host;
pub mod mock;
pub mod pcm;
pub mod player;
pub mod recorder;
pub mod wav;

pub use driver::{BusConfig, Direction, I2sDriver, PinRoles};
pub use duplex::{AudioDuplexController, CaptureToken, DuplexSettings, PlaybackToken};
#[cfg(feature = "cpal-audio")]
pub use host::CpalI2sDriver;
pub use mock::{DriverEvent, MockDriverProbe, MockI2sDriver};
pub use pcm::{PcmBuffer, SharedPcm};
pub use player::{PlaybackReport, Player, PlayerConfig, StreamEnd};
pub use recorder::{Recorder, RecorderConfig, Recording};
pub use wav::{ByteWriter, WAV_HEADER_LEN, WavHeader};
