//! BZIP2: один поток, blockSize100k = уровень сжатия

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::fs::File;
use std::io;

use super::pipeline::{CountingReader, OutputWriter};
use super::stream::StreamCodec;
use super::types::{Algorithm, CompressionLevel};

pub(crate) struct Bzip2;

impl StreamCodec for Bzip2 {
    const ALGORITHM: Algorithm = Algorithm::Bzip2;
    const SUFFIX: &'static str = ".bz2";

    type Encoder = BzEncoder<OutputWriter>;
    type Decoder = BzDecoder<CountingReader<File>>;

    fn encoder(output: OutputWriter, level: CompressionLevel) -> Self::Encoder {
        BzEncoder::new(output, Compression::new(level.get()))
    }

    fn finish(encoder: Self::Encoder) -> io::Result<OutputWriter> {
        encoder.finish()
    }

    fn decoder(input: CountingReader<File>) -> Self::Decoder {
        BzDecoder::new(input)
    }
}
