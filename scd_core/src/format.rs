use crate::error::{Result, ScdError};

/// Size of a FITS logical record. Headers and data sections are both padded
/// to a whole number of records.
pub const RECORD_SIZE: usize = 2880;

/// Size of one header card ("KEYWORD = VALUE / comment", space padded).
pub const CARD_SIZE: usize = 80;

pub const CARDS_PER_RECORD: usize = RECORD_SIZE / CARD_SIZE;

/// Byte offset of the NAXIS1 card inside a compressed header. The writer
/// seeks back here once the compressed length is known.
pub const NAXIS1_CARD_OFFSET: u64 = 3 * CARD_SIZE as u64;

/// Text of the HISTORY card that marks a compressed HDU.
pub const COMPRESSED_MARKER: &str = "*** SDSS COMPRESSED ***";

/// Version byte written at the start of every compressed pixel stream.
pub const FORMAT_VERSION: u8 = 1;

/// Pixels per physical input buffer (16384 bytes of 16-bit samples). Codec
/// parameters are estimated from the first buffer of an image.
pub const BLOCK_PIXELS: usize = 8192;

/// Bytes that precede the packed words: version, lsb count, algorithm.
pub const CONTROL_BYTES: usize = 3;

// ── Keywords ───────────────────────────────────────────────────────────────

pub const KW_SIMPLE: &str = "SIMPLE";
pub const KW_XTENSION: &str = "XTENSION";
pub const KW_BITPIX: &str = "BITPIX";
pub const KW_NAXIS: &str = "NAXIS";
pub const KW_PCOUNT: &str = "PCOUNT";
pub const KW_GCOUNT: &str = "GCOUNT";
pub const KW_HISTORY: &str = "HISTORY";
pub const KW_END: &str = "END";

/// Original geometry of a compressed HDU is carried in these cards.
pub const KW_ZBITPIX: &str = "ZBITPIX";
pub const KW_ZNAXIS: &str = "ZNAXIS";

/// Round `len` up to the next multiple of [`RECORD_SIZE`].
pub fn padded_len(len: u64) -> u64 {
    len.div_ceil(RECORD_SIZE as u64) * RECORD_SIZE as u64
}

/// Number of fill bytes needed after `len` bytes to reach a record boundary.
pub fn padding_for(len: u64) -> usize {
    (padded_len(len) - len) as usize
}

// ── Card ───────────────────────────────────────────────────────────────────

/// One 80-byte header card.
#[derive(Clone, PartialEq, Eq)]
pub struct Card([u8; CARD_SIZE]);

impl Card {
    /// Build a card from text, space padded (or truncated) to 80 bytes.
    pub fn new(text: &str) -> Self {
        let mut buf = [b' '; CARD_SIZE];
        let bytes = text.as_bytes();
        let n = bytes.len().min(CARD_SIZE);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self(buf)
    }

    /// Fixed-format integer card: keyword in columns 1-8, `= ` in 9-10, the
    /// value right-justified to column 30.
    pub fn integer(keyword: &str, value: i64) -> Self {
        Self::new(&format!("{keyword:<8}= {value:>20}"))
    }

    pub fn history(text: &str) -> Self {
        Self::new(&format!("{KW_HISTORY:<8}{text}"))
    }

    pub fn marker() -> Self {
        Self::history(COMPRESSED_MARKER)
    }

    pub fn end() -> Self {
        Self::new(KW_END)
    }

    pub fn from_bytes(buf: &[u8; CARD_SIZE]) -> Self {
        Self(*buf)
    }

    pub fn as_bytes(&self) -> &[u8; CARD_SIZE] {
        &self.0
    }

    /// Keyword with trailing blanks removed.
    pub fn keyword(&self) -> &str {
        std::str::from_utf8(&self.0[..8])
            .unwrap_or("")
            .trim_end()
    }

    fn has_value_indicator(&self) -> bool {
        &self.0[8..10] == b"= "
    }

    /// Value field with any trailing comment stripped. String values are
    /// returned with their quotes.
    pub fn value_str(&self) -> Option<&str> {
        if !self.has_value_indicator() {
            return None;
        }
        let field = std::str::from_utf8(&self.0[10..]).ok()?;
        let trimmed = field.trim_start();
        if trimmed.starts_with('\'') {
            // '' inside a string is an escaped quote
            let bytes = trimmed.as_bytes();
            let mut i = 1;
            while i < bytes.len() {
                if bytes[i] == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    return Some(&trimmed[..=i]);
                }
                i += 1;
            }
            return Some(trimmed.trim_end());
        }
        let value = match trimmed.find('/') {
            Some(pos) => &trimmed[..pos],
            None => trimmed,
        };
        Some(value.trim())
    }

    pub fn int_value(&self) -> Option<i64> {
        self.value_str()?.parse().ok()
    }

    pub fn logical_value(&self) -> Option<bool> {
        match self.value_str()? {
            "T" => Some(true),
            "F" => Some(false),
            _ => None,
        }
    }

    /// True for the HISTORY card carrying [`COMPRESSED_MARKER`].
    pub fn is_marker(&self) -> bool {
        self.keyword() == KW_HISTORY && self.0[8..].starts_with(COMPRESSED_MARKER.as_bytes())
    }

    /// `NAXISn` axis number, if this is an axis-length card.
    fn axis_number(&self) -> Option<usize> {
        self.keyword()
            .strip_prefix(KW_NAXIS)
            .filter(|rest| !rest.is_empty())
            .and_then(|rest| rest.parse().ok())
    }

    /// Same card under another keyword. Columns 9-80 (value indicator, value
    /// and comment) are kept byte for byte.
    pub fn renamed(&self, keyword: &str) -> Option<Card> {
        if keyword.len() > 8 {
            return None;
        }
        let mut buf = self.0;
        buf[..8].fill(b' ');
        buf[..keyword.len()].copy_from_slice(keyword.as_bytes());
        Some(Self(buf))
    }

    /// Cards that describe the data layout of an image HDU.
    fn is_geometry(&self) -> bool {
        matches!(self.keyword(), KW_BITPIX | KW_NAXIS | KW_PCOUNT | KW_GCOUNT)
            || self.axis_number().is_some()
    }

    /// Geometry card moved under a `Z` keyword, as carried by a compressed header.
    fn stashed(&self) -> Option<Card> {
        self.renamed(&format!("Z{}", self.keyword()))
    }

    /// Inverse of [`stashed`](Card::stashed): `None` unless this is a
    /// `Z`-prefixed geometry card.
    fn unstashed(&self) -> Option<Card> {
        let card = self.renamed(self.keyword().strip_prefix('Z')?)?;
        card.is_geometry().then_some(card)
    }
}

impl std::fmt::Debug for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Card({:?})", String::from_utf8_lossy(&self.0).trim_end())
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Which kind of HDU a header opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HduKind {
    Primary,
    Extension,
}

/// Decoded header: every card up to (not including) END.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, keyword: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.keyword() == keyword)
    }

    pub fn int(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(Card::int_value)
    }

    pub fn require_int(&self, keyword: &str) -> Result<i64> {
        self.int(keyword)
            .ok_or_else(|| ScdError::format(format!("header has no integer {keyword} card")))
    }

    pub fn kind(&self) -> Result<HduKind> {
        match self.cards.first().map(Card::keyword) {
            Some(KW_SIMPLE) => Ok(HduKind::Primary),
            Some(KW_XTENSION) => Ok(HduKind::Extension),
            _ => Err(ScdError::format(
                "header does not start with SIMPLE or XTENSION",
            )),
        }
    }

    pub fn bitpix(&self) -> Result<i64> {
        self.require_int(KW_BITPIX)
    }

    pub fn naxis(&self) -> Result<usize> {
        let naxis = self.require_int(KW_NAXIS)?;
        usize::try_from(naxis)
            .ok()
            .filter(|&n| n <= 999)
            .ok_or_else(|| ScdError::format(format!("invalid NAXIS {naxis}")))
    }

    /// Axis lengths NAXIS1..NAXISn.
    pub fn axes(&self) -> Result<Vec<u64>> {
        (1..=self.naxis()?)
            .map(|i| {
                let key = format!("{KW_NAXIS}{i}");
                let len = self.require_int(&key)?;
                u64::try_from(len).map_err(|_| ScdError::format(format!("negative {key}")))
            })
            .collect()
    }

    /// Unpadded byte length of the data section this header declares.
    pub fn data_len(&self) -> Result<u64> {
        let bitpix = self.bitpix()?;
        if !matches!(bitpix, 8 | 16 | 32 | 64 | -32 | -64) {
            return Err(ScdError::format(format!("invalid BITPIX {bitpix}")));
        }
        let axes = self.axes()?;
        if axes.is_empty() {
            return Ok(0);
        }
        let pcount = self.int(KW_PCOUNT).unwrap_or(0).max(0) as u64;
        let gcount = self.int(KW_GCOUNT).unwrap_or(1).max(0) as u64;
        element_count(&axes)?
            .checked_add(pcount)
            .and_then(|n| n.checked_mul(gcount))
            .and_then(|n| n.checked_mul(bitpix.unsigned_abs() / 8))
            // the padded length must stay representable too
            .filter(|&n| n <= u64::MAX - RECORD_SIZE as u64)
            .ok_or_else(|| ScdError::format("data section length overflows"))
    }

    /// True when this header carries the compression marker card.
    pub fn is_compressed(&self) -> bool {
        self.cards.iter().any(Card::is_marker)
    }

    /// Serialize cards plus END, space padded to a whole record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(padded_len(((self.cards.len() + 1) * CARD_SIZE) as u64) as usize);
        for card in &self.cards {
            buf.extend_from_slice(card.as_bytes());
        }
        buf.extend_from_slice(Card::end().as_bytes());
        buf.resize(padded_len(buf.len() as u64) as usize, b' ');
        buf
    }

    /// False when the header already uses the keywords a compressed header
    /// needs, or has a geometry keyword too long to take the `Z` prefix.
    pub fn can_compress(&self) -> bool {
        !self.is_compressed()
            && self.cards.iter().skip(1).all(|card| {
                card.unstashed().is_none() && (!card.is_geometry() || card.stashed().is_some())
            })
    }

    /// Header for the compressed form of this (16-bit image) HDU.
    ///
    /// NAXIS1 is written as 0 at [`NAXIS1_CARD_OFFSET`] and patched later.
    /// After the marker card come the original cards in their original
    /// order, with BITPIX, NAXIS, NAXISn, PCOUNT and GCOUNT renamed to
    /// ZBITPIX, ZNAXIS, ZNAXISn, ZPCOUNT and ZGCOUNT.
    pub fn to_compressed(&self) -> Result<Header> {
        let kind = self.kind()?;
        if !self.can_compress() {
            return Err(ScdError::format(
                "header already carries compression keywords",
            ));
        }

        let mut cards = vec![
            self.cards[0].clone(),
            Card::integer(KW_BITPIX, 8),
            Card::integer(KW_NAXIS, 1),
            Card::integer("NAXIS1", 0),
        ];
        if kind == HduKind::Extension || self.get(KW_PCOUNT).is_some() {
            cards.push(Card::integer(KW_PCOUNT, 0));
        }
        if kind == HduKind::Extension || self.get(KW_GCOUNT).is_some() {
            cards.push(Card::integer(KW_GCOUNT, 1));
        }
        cards.push(Card::marker());
        for card in &self.cards[1..] {
            if !card.is_geometry() {
                cards.push(card.clone());
                continue;
            }
            let stashed = card.stashed().ok_or_else(|| {
                ScdError::format(format!("{} cannot take a Z prefix", card.keyword()))
            })?;
            cards.push(stashed);
        }
        Ok(Header { cards })
    }

    /// Rebuild the original header from a compressed one.
    pub fn to_original(&self) -> Result<Header> {
        self.kind()?;
        let marker = self
            .cards
            .iter()
            .position(Card::is_marker)
            .ok_or_else(|| ScdError::format(format!("missing HISTORY {COMPRESSED_MARKER} card")))?;
        if self.get(KW_ZBITPIX).is_none() || self.get(KW_ZNAXIS).is_none() {
            return Err(ScdError::format("compressed header has no ZBITPIX/ZNAXIS cards"));
        }

        let mut cards = vec![self.cards[0].clone()];
        cards.extend(
            self.cards[marker + 1..]
                .iter()
                .map(|card| card.unstashed().unwrap_or_else(|| card.clone())),
        );
        Ok(Header { cards })
    }
}

/// Number of elements in an array with these axis lengths.
pub fn element_count(axes: &[u64]) -> Result<u64> {
    axes.iter()
        .try_fold(1u64, |n, &len| n.checked_mul(len))
        .ok_or_else(|| ScdError::format("axis lengths overflow"))
}
