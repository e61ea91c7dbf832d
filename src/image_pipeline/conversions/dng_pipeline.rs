use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{info, instrument};

use crate::image_pipeline::common::error::{DngError, Result};
use crate::image_pipeline::common::host::{Host, HostConfig};
use crate::image_pipeline::common::timing::{PipelineTimings, Timer};
use crate::image_pipeline::conversions::metadata_store::{self, ItemId, MetadataStore};
use crate::image_pipeline::negative::Negative;
use crate::image_pipeline::raw::{AutoReader, RawImageReader};
use crate::image_pipeline::writer::{DngWriter, ImageWriter, WriterConfig};

/// Raw file in, DNG (or TIFF) out: parse, stage 1, optionally stages 2
/// and 3, write.
pub struct DngPipeline<R: RawImageReader, W: ImageWriter> {
    reader: R,
    writer: W,
    host: Host,
    config: WriterConfig,
}

impl DngPipeline<AutoReader, DngWriter> {
    pub fn new(host_config: HostConfig, config: WriterConfig) -> Self {
        Self {
            reader: AutoReader,
            writer: DngWriter,
            host: Host::new(host_config),
            config,
        }
    }
}

impl<R: RawImageReader, W: ImageWriter> DngPipeline<R, W> {
    pub fn with_custom(reader: R, writer: W, host: Host, config: WriterConfig) -> Self {
        Self {
            reader,
            writer,
            host,
            config,
        }
    }

    fn run(
        &self,
        input_data: &[u8],
        output: &mut dyn Write,
        mut metadata: Option<(&mut dyn MetadataStore, ItemId)>,
    ) -> Result<PipelineTimings> {
        let mut timings = PipelineTimings::new();
        let host = &self.host;

        let timer = Timer::start("read_negative");
        let mut negative = self.reader.read_negative(input_data, host)?;
        let (name, duration) = timer.stop();
        timings.add_step(name, duration);

        if self.writer.needs_stage3(host) {
            let timer = Timer::start("build_stage2");
            negative.build_stage2(host)?;
            let (name, duration) = timer.stop();
            timings.add_step(name, duration);

            let timer = Timer::start("build_stage3");
            negative.build_stage3(host)?;
            let (name, duration) = timer.stop();
            timings.add_step(name, duration);
        }

        if let Some((store, item)) = metadata.as_mut() {
            metadata_store::apply_to_negative(&**store, *item, &mut negative);
        }

        let timer = Timer::start("write");
        self.writer
            .write_negative(&mut negative, host, output, &self.config)?;
        let (name, duration) = timer.stop();
        timings.add_step(name, duration);

        if let Some((store, item)) = metadata {
            metadata_store::record_from_negative(store, item, &negative)?;
        }
        self.finish(&mut negative)?;

        info!(
            "Conversion of \"{}\" complete in {:.3}ms",
            negative.model_name,
            timings.total_duration().as_secs_f64() * 1000.0
        );
        Ok(timings)
    }

    fn finish(&self, negative: &mut Negative) -> Result<()> {
        negative.finalize()?;
        negative.release_images();
        Ok(())
    }

    #[instrument(skip(self, input_data, output), fields(input_size = input_data.len()))]
    pub fn convert(&self, input_data: &[u8], output: &mut dyn Write) -> Result<()> {
        self.run(input_data, output, None).map(|_| ())
    }

    pub fn convert_with_timings(
        &self,
        input_data: &[u8],
        output: &mut dyn Write,
    ) -> Result<PipelineTimings> {
        self.run(input_data, output, None)
    }

    /// Converts with catalogue metadata of `item` applied before writing,
    /// and records the negative's metadata back afterwards.
    pub fn convert_with_metadata(
        &self,
        input_data: &[u8],
        output: &mut dyn Write,
        store: &mut dyn MetadataStore,
        item: ItemId,
    ) -> Result<()> {
        self.run(input_data, output, Some((store, item))).map(|_| ())
    }

    #[instrument(skip(self, input_path, output_path))]
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
    ) -> Result<()> {
        self.convert_file_with_timings(input_path, output_path)
            .map(|_| ())
    }

    pub fn convert_file_with_timings<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_path: Q,
    ) -> Result<PipelineTimings> {
        let mut timings = PipelineTimings::new();
        let input_path = input_path.as_ref();
        let output_path = output_path.as_ref();

        info!(
            input = %input_path.display(),
            output = %output_path.display(),
            "Converting file"
        );

        let timer = Timer::start("read_input_file");
        let input_data = std::fs::read(input_path)
            .map_err(|e| DngError::OpenFile(format!("{}: {}", input_path.display(), e)))?;
        let (name, duration) = timer.stop();
        timings.add_step(name, duration);

        // Converted into memory first so a failed conversion leaves no file.
        let mut encoded = Vec::new();
        let conversion_timings = self.run(&input_data, &mut encoded, None)?;
        for step in conversion_timings.steps() {
            timings.add_step(step.name.clone(), step.duration);
        }

        let timer = Timer::start("write_output_file");
        std::fs::write(output_path, &encoded)
            .map_err(|e| DngError::WriteFile(format!("{}: {}", output_path.display(), e)))?;
        let (name, duration) = timer.stop();
        timings.add_step(name, duration);

        Ok(timings)
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Flag that cancels a running conversion when set.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.host.abort_handle()
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WriterConfig) {
        self.config = config;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::common::geometry::Rect;
    use crate::image_pipeline::common::host::DNG_VERSION_1_4;
    use crate::image_pipeline::common::image::{PixelType, StageImage};
    use crate::image_pipeline::common::matrix::{Matrix, Vector};
    use crate::image_pipeline::common::rational::URational;
    use crate::image_pipeline::conversions::metadata_store::InMemoryMetadataStore;
    use crate::image_pipeline::linearization::LinearizationInfo;
    use crate::image_pipeline::mosaic::MosaicInfo;
    use crate::image_pipeline::mosaic::info::{CFA_BLUE, CFA_GREEN, CFA_RED};
    use crate::image_pipeline::negative::NegativeState;
    use crate::image_pipeline::profile::CameraProfile;
    use crate::image_pipeline::profile::illuminant::D65;
    use crate::image_pipeline::writer::StandardTiffWriter;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// What a writer saw when it was called.
    #[derive(Debug, Clone)]
    struct WriteRecord {
        state: NegativeState,
        has_stage1: bool,
        stage3_planes: Option<usize>,
        comment: String,
    }

    fn synthetic_negative(host: &Host) -> Negative {
        let mut negative = Negative::new();
        negative.model_name = "Mock Camera".to_string();
        negative.mosaic = Some(
            MosaicInfo::new(2, 2, vec![0, 1, 1, 2], vec![CFA_RED, CFA_GREEN, CFA_BLUE]).unwrap(),
        );
        negative.linearization = Some(LinearizationInfo::uniform(
            Rect::from_size(8, 8),
            1,
            0.0,
            4095.0,
        ));
        negative.raw_bits = 12;
        negative.default_crop_size_h = URational::new(8, 1);
        negative.default_crop_size_v = URational::new(8, 1);
        negative.set_color_channels(3);
        negative.camera_neutral = Vector::from_slice(&[0.5, 1.0, 0.8]);
        let mut profile = CameraProfile::default();
        profile.calibration_illuminant_1 = D65;
        profile.color_matrix_1 = Matrix::identity(3);
        negative.add_profile(profile);
        negative.finish_parse(host).unwrap();

        let mut image = StageImage::new(8, 8, 1, PixelType::U16);
        for (i, v) in image.data.iter_mut().enumerate() {
            *v = (100 + i * 50) as u16;
        }
        negative.set_stage1(image).unwrap();
        negative
    }

    struct MockReader {
        should_fail: bool,
    }

    impl RawImageReader for MockReader {
        fn read_negative(&self, _data: &[u8], host: &Host) -> Result<Negative> {
            if self.should_fail {
                return Err(DngError::Decode("Mock decode error".to_string()));
            }
            Ok(synthetic_negative(host))
        }
    }

    struct MockWriter {
        should_fail: bool,
        wants_stage3: bool,
        written: Arc<Mutex<Vec<WriteRecord>>>,
    }

    impl ImageWriter for MockWriter {
        fn needs_stage3(&self, _host: &Host) -> bool {
            self.wants_stage3
        }

        fn write_negative(
            &self,
            negative: &mut Negative,
            _host: &Host,
            output: &mut dyn Write,
            _config: &WriterConfig,
        ) -> Result<()> {
            if self.should_fail {
                return Err(DngError::Encode("Mock encode error".to_string()));
            }
            self.written.lock().unwrap().push(WriteRecord {
                state: negative.state(),
                has_stage1: negative.stage1_image().is_some(),
                stage3_planes: negative.stage3_image().map(|i| i.planes),
                comment: negative.exif.user_comment.clone(),
            });
            output.write_all(b"mock")?;
            Ok(())
        }
    }

    fn mock_pipeline(
        reader_fails: bool,
        writer_fails: bool,
        wants_stage3: bool,
    ) -> (DngPipeline<MockReader, MockWriter>, Arc<Mutex<Vec<WriteRecord>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let pipeline = DngPipeline::with_custom(
            MockReader {
                should_fail: reader_fails,
            },
            MockWriter {
                should_fail: writer_fails,
                wants_stage3,
                written: written.clone(),
            },
            Host::default(),
            WriterConfig::default(),
        );
        (pipeline, written)
    }

    #[test]
    fn raw_writer_sees_stage1() {
        let (pipeline, written) = mock_pipeline(false, false, false);
        let mut output = Cursor::new(Vec::new());
        pipeline.convert(b"fake raw data", &mut output).unwrap();

        let records = written.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, NegativeState::Stage1Read);
        assert!(records[0].has_stage1);
        assert_eq!(records[0].stage3_planes, None);
        assert_eq!(output.into_inner(), b"mock");
    }

    #[test]
    fn rendering_writer_gets_stage3() {
        let (pipeline, written) = mock_pipeline(false, false, true);
        let mut output = Cursor::new(Vec::new());
        let timings = pipeline
            .convert_with_timings(b"fake raw data", &mut output)
            .unwrap();

        let records = written.lock().unwrap();
        assert_eq!(records[0].state, NegativeState::Stage3Built);
        assert_eq!(records[0].stage3_planes, Some(3));
        for step in ["read_negative", "build_stage2", "build_stage3", "write"] {
            assert!(timings.get_step(step).is_some(), "missing step {}", step);
        }
    }

    #[test]
    fn reader_failure_stops_pipeline() {
        let (pipeline, written) = mock_pipeline(true, false, false);
        let mut output = Cursor::new(Vec::new());
        let result = pipeline.convert(b"fake raw data", &mut output);
        assert!(matches!(result, Err(DngError::Decode(_))));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn writer_failure_is_reported() {
        let (pipeline, _) = mock_pipeline(false, true, false);
        let mut output = Cursor::new(Vec::new());
        let result = pipeline.convert(b"fake raw data", &mut output);
        assert!(matches!(result, Err(DngError::Encode(_))));
    }

    #[test]
    fn abort_cancels_conversion() {
        let (pipeline, written) = mock_pipeline(false, false, true);
        pipeline.host().request_abort();
        let mut output = Cursor::new(Vec::new());
        let result = pipeline.convert(b"fake raw data", &mut output);
        assert!(matches!(result, Err(DngError::UserCanceled)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn catalogue_metadata_reaches_the_writer() {
        let (pipeline, written) = mock_pipeline(false, false, false);
        let mut store = InMemoryMetadataStore::new();
        store.set_comment(12, "Catalogued").unwrap();
        let mut output = Cursor::new(Vec::new());
        pipeline
            .convert_with_metadata(b"fake raw data", &mut output, &mut store, 12)
            .unwrap();
        assert_eq!(written.lock().unwrap()[0].comment, "Catalogued");
    }

    #[test]
    fn dng_written_by_one_pipeline_reads_back_in_another() {
        let host = Host::default();
        let mut negative = synthetic_negative(&host);
        let dng = DngWriter
            .encode(&mut negative, &host, &WriterConfig::default())
            .unwrap();

        let pipeline = DngPipeline::new(
            HostConfig::builder().save_dng_version(DNG_VERSION_1_4).build(),
            WriterConfig::builder().tile_size(None).build(),
        );
        let mut output = Vec::new();
        pipeline.convert(&dng, &mut output).unwrap();
        assert!(output.len() > 8);
        assert_eq!(&output[..4], b"II*\0");
    }

    #[test]
    fn tiff_export_renders_stage3() {
        let host = Host::default();
        let mut negative = synthetic_negative(&host);
        let dng = DngWriter
            .encode(&mut negative, &host, &WriterConfig::default())
            .unwrap();

        let pipeline = DngPipeline::with_custom(
            AutoReader,
            StandardTiffWriter,
            Host::default(),
            WriterConfig::default(),
        );
        let mut output = Vec::new();
        pipeline.convert(&dng, &mut output).unwrap();

        let mut decoder = tiff::decoder::Decoder::new(Cursor::new(output)).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (8, 8));
    }

    #[test]
    fn missing_input_file_is_open_error() {
        let (pipeline, _) = mock_pipeline(false, false, false);
        let dir = tempfile::tempdir().unwrap();
        let result = pipeline.convert_file(dir.path().join("missing.raw"), dir.path().join("out.dng"));
        assert!(matches!(result, Err(DngError::OpenFile(_))));
        assert!(!dir.path().join("out.dng").exists());
    }
}
