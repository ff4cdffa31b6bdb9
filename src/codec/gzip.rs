//! GZIP: один член RFC 1952

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;

use super::pipeline::{CountingReader, OutputWriter};
use super::stream::StreamCodec;
use super::types::{Algorithm, CompressionLevel};

pub(crate) struct Gzip;

impl StreamCodec for Gzip {
    const ALGORITHM: Algorithm = Algorithm::Gzip;
    const SUFFIX: &'static str = ".gz";

    type Encoder = GzEncoder<OutputWriter>;
    // GzDecoder читает ровно один член, хвост после него игнорируется
    type Decoder = GzDecoder<CountingReader<File>>;

    fn encoder(output: OutputWriter, level: CompressionLevel) -> Self::Encoder {
        GzEncoder::new(output, Compression::new(level.get()))
    }

    fn finish(encoder: Self::Encoder) -> io::Result<OutputWriter> {
        encoder.finish()
    }

    fn decoder(input: CountingReader<File>) -> Self::Decoder {
        GzDecoder::new(input)
    }
}
