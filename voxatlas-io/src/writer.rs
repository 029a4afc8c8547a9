//! File writers for fused volumes, LUTs and histograms.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use voxatlas_core::{Histogram, Lut, LUT_SIZE};
use voxatlas_volume::FusedVolume;

use crate::Result;

/// Buffered writer for voxatlas outputs.
pub struct DataFileWriter {
    writer: BufWriter<File>,
}

impl DataFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes fused voxels as raw interleaved RGBA bytes, x-fastest.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_fused_rgba(&mut self, fused: &FusedVolume) -> Result<()> {
        self.writer.write_all(fused.rgba())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes LUTs as CSV, one row per input intensity and one column per LUT.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_luts_csv(&mut self, names: &[&str], luts: &[Lut]) -> Result<()> {
        write!(self.writer, "value")?;
        for (i, _) in luts.iter().enumerate() {
            match names.get(i) {
                Some(name) => write!(self.writer, ",{name}")?,
                None => write!(self.writer, ",lut_{i}")?,
            }
        }
        writeln!(self.writer)?;

        for value in 0..LUT_SIZE {
            write!(self.writer, "{value}")?;
            for lut in luts {
                write!(self.writer, ",{}", lut.values()[value])?;
            }
            writeln!(self.writer)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes a histogram as CSV with one row per non-empty bin.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_histogram_csv(&mut self, histogram: &Histogram) -> Result<()> {
        writeln!(self.writer, "value,count")?;
        for (value, &count) in histogram.bins().iter().enumerate() {
            if count > 0 {
                writeln!(self.writer, "{value},{count}")?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use voxatlas_core::{ChannelBuffer, VolumeDims};
    use voxatlas_volume::{fuse, FusionConfig, FusionEntry};

    #[test]
    fn test_write_luts_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = DataFileWriter::create(file.path()).unwrap();

        writer
            .write_luts_csv(&["dna"], &[Lut::identity(), Lut::flat(9)])
            .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 257);
        assert_eq!(lines[0], "value,dna,lut_1");
        assert_eq!(lines[1], "0,0,9");
        assert_eq!(lines[256], "255,255,9");
    }

    #[test]
    fn test_write_histogram_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = DataFileWriter::create(file.path()).unwrap();

        writer
            .write_histogram_csv(&Histogram::build(&[0, 0, 5, 200, 5]))
            .unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "value,count\n0,2\n5,2\n200,1\n");
    }

    #[test]
    fn test_write_fused_rgba() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = DataFileWriter::create(file.path()).unwrap();

        let mut channel = ChannelBuffer::new("c", VolumeDims::new(3, 1, 1));
        channel.set_from_volume(vec![0, 128, 255]).unwrap();
        let fused = fuse(
            &[FusionEntry::new(0, [255, 0, 0])],
            &FusionConfig::default(),
            &[channel],
        )
        .unwrap();
        writer.write_fused_rgba(&fused).unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), 12);
        assert_eq!(&data[8..12], &[255, 0, 0, 255]);
    }
}
