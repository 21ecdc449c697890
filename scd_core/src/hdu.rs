use std::io::{self, Read};

use log::trace;

use crate::error::{Result, ScdError};
use crate::format::{padded_len, Card, HduKind, Header, CARD_SIZE, KW_END, RECORD_SIZE};

/// One header/data unit as it appears in the stream.
#[derive(Debug, Clone)]
pub struct RawHdu {
    /// Zero-based position in the container (0 = primary).
    pub index: usize,
    pub header: Header,
    /// Header records exactly as read, END card and padding included.
    pub header_bytes: Vec<u8>,
    /// Data records exactly as read, padding included.
    pub data: Vec<u8>,
    /// Unpadded data length declared by the header.
    pub data_len: u64,
}

impl RawHdu {
    /// The data section without record padding.
    pub fn data_section(&self) -> &[u8] {
        &self.data[..self.data_len as usize]
    }

    /// Bytes this HDU occupies in the stream.
    pub fn stored_len(&self) -> u64 {
        (self.header_bytes.len() + self.data.len()) as u64
    }
}

/// Sequential HDU reader over any byte stream (file, stdin, in-memory).
///
/// HDUs are located by walking header and data records at 2880-byte strides;
/// there is no index, so the Nth HDU is reached by reading the N before it.
pub struct HduReader<R> {
    input: R,
    index: usize,
    bytes_read: u64,
}

impl<R: Read> HduReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            index: 0,
            bytes_read: 0,
        }
    }

    /// Index the next HDU will have.
    pub fn position(&self) -> usize {
        self.index
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next HDU, or `None` at a clean end of stream.
    pub fn next_hdu(&mut self) -> Result<Option<RawHdu>> {
        let Some((header, header_bytes)) = self.read_header()? else {
            return Ok(None);
        };
        let data_len = header.data_len()?;
        let stored = padded_len(data_len);

        let mut data = Vec::new();
        let got = (&mut self.input).take(stored).read_to_end(&mut data)?;
        self.bytes_read += got as u64;
        if (got as u64) < stored {
            return Err(ScdError::UnexpectedEof);
        }

        let index = self.index;
        self.index += 1;
        trace!("hdu {index}: {} header bytes, {data_len} data bytes", header_bytes.len());
        Ok(Some(RawHdu {
            index,
            header,
            header_bytes,
            data,
            data_len,
        }))
    }

    /// Read past the next HDU without keeping its data.
    pub fn skip_hdu(&mut self) -> Result<Option<Header>> {
        let Some((header, _)) = self.read_header()? else {
            return Ok(None);
        };
        let stored = padded_len(header.data_len()?);
        let skipped = io::copy(&mut (&mut self.input).take(stored), &mut io::sink())?;
        self.bytes_read += skipped;
        if skipped < stored {
            return Err(ScdError::UnexpectedEof);
        }
        trace!("skipped hdu {}", self.index);
        self.index += 1;
        Ok(Some(header))
    }

    fn read_header(&mut self) -> Result<Option<(Header, Vec<u8>)>> {
        let mut bytes = Vec::with_capacity(RECORD_SIZE);
        let mut cards = Vec::new();
        let mut record = [0u8; RECORD_SIZE];

        loop {
            if !self.read_record(&mut record)? {
                if bytes.is_empty() {
                    return Ok(None);
                }
                return Err(ScdError::UnexpectedEof);
            }
            bytes.extend_from_slice(&record);

            let mut ended = false;
            for chunk in record.chunks_exact(CARD_SIZE) {
                let card = Card::from_bytes(chunk.try_into().map_err(|_| ScdError::UnexpectedEof)?);
                if card.keyword() == KW_END {
                    ended = true;
                    break;
                }
                cards.push(card);
            }
            if ended {
                break;
            }
        }

        let header = Header::new(cards);
        let expected = if self.index == 0 {
            HduKind::Primary
        } else {
            HduKind::Extension
        };
        let kind = header.kind()?;
        if kind != expected {
            return Err(ScdError::format(format!(
                "hdu {} opens with {:?} header, expected {:?}",
                self.index, kind, expected
            )));
        }
        Ok(Some((header, bytes)))
    }

    /// Fill `record` completely. Returns false on a clean end of stream
    /// before the first byte.
    fn read_record(&mut self, record: &mut [u8; RECORD_SIZE]) -> Result<bool> {
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.input.read(&mut record[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.bytes_read += filled as u64;
        match filled {
            0 => Ok(false),
            RECORD_SIZE => Ok(true),
            _ => Err(ScdError::UnexpectedEof),
        }
    }
}

impl<R: Read> Iterator for HduReader<R> {
    type Item = Result<RawHdu>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_hdu().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary(bitpix: i64, nx: i64, ny: i64) -> Vec<u8> {
        Header::new(vec![
            Card::new("SIMPLE  =                    T"),
            Card::integer("BITPIX", bitpix),
            Card::integer("NAXIS", 2),
            Card::integer("NAXIS1", nx),
            Card::integer("NAXIS2", ny),
        ])
        .to_bytes()
    }

    #[test]
    fn reads_header_and_padded_data() {
        let mut file = primary(16, 10, 10);
        file.extend(vec![7u8; 200]);
        file.resize(2 * RECORD_SIZE, 0);

        let mut reader = HduReader::new(file.as_slice());
        let hdu = reader.next_hdu().unwrap().unwrap();
        assert_eq!(hdu.index, 0);
        assert_eq!(hdu.data_len, 200);
        assert_eq!(hdu.data.len(), RECORD_SIZE);
        assert_eq!(hdu.data_section(), &[7u8; 200][..]);
        assert!(reader.next_hdu().unwrap().is_none());
        assert_eq!(reader.bytes_read(), 2 * RECORD_SIZE as u64);
    }

    #[test]
    fn truncated_data_is_unexpected_eof() {
        let mut file = primary(16, 100, 100);
        file.extend(vec![0u8; RECORD_SIZE]);
        let err = HduReader::new(file.as_slice()).next_hdu().unwrap_err();
        assert!(matches!(err, ScdError::UnexpectedEof));
    }

    #[test]
    fn partial_record_is_unexpected_eof() {
        let file = vec![b' '; 100];
        let err = HduReader::new(file.as_slice()).next_hdu().unwrap_err();
        assert!(matches!(err, ScdError::UnexpectedEof));
    }

    #[test]
    fn primary_must_start_with_simple() {
        let mut file = Header::new(vec![Card::new("XTENSION= 'IMAGE   '")]).to_bytes();
        file.resize(RECORD_SIZE, b' ');
        let err = HduReader::new(file.as_slice()).next_hdu().unwrap_err();
        assert!(matches!(err, ScdError::Format(_)));
    }

    #[test]
    fn iterates_over_every_hdu() {
        let mut file = primary(8, 0, 0);
        file.extend(
            Header::new(vec![
                Card::new("XTENSION= 'IMAGE   '"),
                Card::integer("BITPIX", 16),
                Card::integer("NAXIS", 0),
            ])
            .to_bytes(),
        );
        let hdus: Vec<RawHdu> = HduReader::new(file.as_slice())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hdus.len(), 2);
        assert_eq!(hdus[1].index, 1);
        assert_eq!(hdus[1].header.bitpix().unwrap(), 16);
    }

    #[test]
    fn skip_hdu_advances_position() {
        let mut file = primary(16, 10, 10);
        file.resize(2 * RECORD_SIZE, 0);
        let mut reader = HduReader::new(file.as_slice());
        let header = reader.skip_hdu().unwrap().unwrap();
        assert_eq!(header.bitpix().unwrap(), 16);
        assert_eq!(reader.position(), 1);
        assert!(reader.skip_hdu().unwrap().is_none());
    }
}
