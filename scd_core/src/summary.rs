use crate::codec::ImageStats;

/// What happened to one HDU on its way through the compressor or decompressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HduSummary {
    pub index: usize,
    /// BITPIX of the original (uncompressed) HDU.
    pub bitpix: i64,
    /// Original axis lengths.
    pub axes: Vec<u64>,
    /// Header plus padded data of the original HDU.
    pub raw_bytes: u64,
    /// Header plus padded data of the compressed HDU.
    pub stored_bytes: u64,
    /// Set when the pixels went through the codec; `None` for verbatim HDUs.
    pub stats: Option<ImageStats>,
    /// xxh3-64 of the original data section, padding excluded.
    pub checksum: u64,
}

impl HduSummary {
    pub fn is_compressed(&self) -> bool {
        self.stats.is_some()
    }

    /// Compression ratio (raw / stored).
    pub fn ratio(&self) -> f64 {
        ratio(self.raw_bytes, self.stored_bytes)
    }
}

/// Totals for a whole container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub hdus: Vec<HduSummary>,
}

impl Summary {
    pub fn raw_bytes(&self) -> u64 {
        self.hdus.iter().map(|h| h.raw_bytes).sum()
    }

    pub fn stored_bytes(&self) -> u64 {
        self.hdus.iter().map(|h| h.stored_bytes).sum()
    }

    pub fn compressed_hdus(&self) -> usize {
        self.hdus.iter().filter(|h| h.is_compressed()).count()
    }

    pub fn ratio(&self) -> f64 {
        ratio(self.raw_bytes(), self.stored_bytes())
    }
}

fn ratio(raw: u64, stored: u64) -> f64 {
    if stored == 0 {
        return 1.0;
    }
    raw as f64 / stored as f64
}
