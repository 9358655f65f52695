use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Frame decoder turning bytes in a legacy charset into UTF-8 chunks.
///
/// A leading BOM for the source charset is consumed by `encoding_rs`.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    finished: bool,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            finished: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or(src.len() * 3);
        let mut out = vec![0u8; capacity];
        let (_, read, written, _) = self.decoder.decode_to_utf8(src, &mut out, last);
        src.advance(read);
        out.truncate(written);
        (!out.is_empty()).then(|| BytesMut::from(&out[..]))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // A trailing partial sequence is held by the decoder until the next call.
        Ok(self.transcode(src, false))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // The decoder must not be fed again once flushed.
        if self.finished {
            src.clear();
            return Ok(None);
        }
        self.finished = true;
        let out = self.transcode(src, true);
        src.clear();
        Ok(out)
    }
}
