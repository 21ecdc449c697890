pub mod codec;
pub mod error;
pub mod format;
pub mod guard;
pub mod hdu;
pub mod reader;
pub mod summary;
pub mod writer;

pub use codec::{Algorithm, Codec, CodecParameters, ImageStats};
pub use error::{Result, ScdError};
pub use format::{Card, Header, COMPRESSED_MARKER, FORMAT_VERSION, RECORD_SIZE};
pub use guard::OutputGuard;
pub use hdu::{HduReader, RawHdu};
pub use reader::{decompress, DecompressConfig, Reader};
pub use summary::{HduSummary, Summary};
pub use writer::{compress, CompressConfig, Writer};
