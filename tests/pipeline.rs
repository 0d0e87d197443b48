use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};
use renlian::{
  Annotator, ArtifactStore, BoundingBox, DetectParams, DetectionResult, ErrorKind, FaceDetector,
  Pipeline, PipelineConfig, UploadRequest, normalize::Decode,
};
use tempfile::TempDir;

/// 返回固定框，并记录收到的灰度图尺寸与参数
#[derive(Default)]
struct ScriptedDetector {
  boxes: Vec<BoundingBox>,
  seen: Mutex<Vec<((u32, u32), DetectParams)>>,
}

impl ScriptedDetector {
  fn with_boxes(boxes: Vec<BoundingBox>) -> Self {
    Self {
      boxes,
      ..Default::default()
    }
  }
}

impl FaceDetector for ScriptedDetector {
  fn detect(&self, gray: &GrayImage, params: &DetectParams) -> DetectionResult {
    self.seen.lock().unwrap().push((gray.dimensions(), *params));
    DetectionResult::new(self.boxes.clone())
  }
}

/// 统计调用次数的解码器
#[derive(Default)]
struct CountingDecode {
  calls: Arc<AtomicUsize>,
}

impl Decode for CountingDecode {
  fn decode(&self, raw_bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    image::load_from_memory(raw_bytes)
  }
}

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
  let image = RgbImage::from_fn(width, height, |x, y| {
    Rgb([(x % 200) as u8, (y % 200) as u8, ((x + y) % 100) as u8])
  });
  let mut buf = Cursor::new(Vec::new());
  image.write_to(&mut buf, format).unwrap();
  buf.into_inner()
}

fn png(width: u32, height: u32) -> Vec<u8> {
  encoded(width, height, ImageFormat::Png)
}

fn setup(detector: Arc<ScriptedDetector>) -> (TempDir, Pipeline) {
  setup_with(PipelineConfig::default(), detector)
}

fn setup_with(config: PipelineConfig, detector: Arc<ScriptedDetector>) -> (TempDir, Pipeline) {
  let root = tempfile::tempdir().unwrap();
  let store = ArtifactStore::provision(root.path().join("static")).unwrap();
  let pipeline = Pipeline::new(config, Box::new(detector), store);
  (root, pipeline)
}

fn file_count(dir: &Path) -> usize {
  std::fs::read_dir(dir).unwrap().count()
}

#[test]
fn supported_extensions_pass_validation() {
  let (_root, pipeline) = setup(Arc::new(ScriptedDetector::default()));
  for name in ["face.png", "face.PNG", "face.jpg", "face.JPEG", "face.jpeg", "face.Bmp"] {
    let outcome = pipeline.run(&UploadRequest::new(name, png(32, 24))).unwrap();
    assert_eq!(outcome.face_count, 0, "{}", name);
  }
}

#[test]
fn unsupported_extensions_are_rejected() {
  let detector = Arc::new(ScriptedDetector::default());
  let (_root, pipeline) = setup(detector.clone());
  for name in ["face.gif", "notes.txt", "face"] {
    let err = pipeline.run(&UploadRequest::new(name, png(32, 24))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat, "{}", name);
  }
  assert!(detector.seen.lock().unwrap().is_empty());
  assert_eq!(file_count(&pipeline.store().uploads_dir()), 0);
}

#[test]
fn empty_upload_is_invalid_input() {
  let (_root, pipeline) = setup(Arc::new(ScriptedDetector::default()));
  let err = pipeline.run(&UploadRequest::new("face.png", Vec::new())).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
  let err = pipeline.run(&UploadRequest::new("", png(4, 4))).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn oversized_payload_is_rejected_before_decode() {
  let calls = Arc::new(AtomicUsize::new(0));
  let detector = Arc::new(ScriptedDetector::default());
  let (_root, pipeline) = setup_with(
    PipelineConfig::default().with_max_payload_bytes(1024),
    detector.clone(),
  );
  let pipeline = pipeline.with_decoder(Box::new(CountingDecode {
    calls: calls.clone(),
  }));

  let payload = vec![0xAB; 2048];
  let err = pipeline.run(&UploadRequest::new("big.png", payload)).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
  assert_eq!(calls.load(Ordering::SeqCst), 0);
  assert!(detector.seen.lock().unwrap().is_empty());

  pipeline.run(&UploadRequest::new("small.png", png(4, 4))).unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn undecodable_bytes_fail_without_artifacts() {
  let (_root, pipeline) = setup(Arc::new(ScriptedDetector::default()));
  let err = pipeline
    .run(&UploadRequest::new("face.png", b"GIF89a not really".to_vec()))
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::DecodeError);
  assert_eq!(file_count(&pipeline.store().uploads_dir()), 0);
  assert_eq!(file_count(&pipeline.store().outputs_dir()), 0);
}

#[test]
fn disallowed_containers_behind_allowed_names_fail_to_decode() {
  let detector = Arc::new(ScriptedDetector::default());
  let (_root, pipeline) = setup(detector.clone());

  let gif = b"GIF89a\x01\x00\x01\x00\x80\x00\x00\xff\xff\xff\x00\x00\x00!\xf9\x04\x01\x00\x00\x00\x00,\x00\x00\x00\x00\x01\x00\x01\x00\x00\x02\x02D\x01\x00;";
  let err = pipeline.run(&UploadRequest::new("x.png", gif.to_vec())).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::DecodeError);

  let mut pnm = b"P6\n2 2\n255\n".to_vec();
  pnm.extend_from_slice(&[0x7F; 12]);
  let err = pipeline.run(&UploadRequest::new("x.jpg", pnm)).unwrap_err();
  assert_eq!(err.kind(), ErrorKind::DecodeError);

  assert!(detector.seen.lock().unwrap().is_empty());
  assert_eq!(file_count(&pipeline.store().uploads_dir()), 0);
  assert_eq!(file_count(&pipeline.store().outputs_dir()), 0);
}

#[test]
fn small_images_keep_their_dimensions() {
  let detector = Arc::new(ScriptedDetector::default());
  let (_root, pipeline) = setup(detector.clone());
  let outcome = pipeline.run(&UploadRequest::new("face.png", png(1200, 900))).unwrap();
  assert_eq!(outcome.dimensions, (1200, 900));
  assert_eq!(
    detector.seen.lock().unwrap()[0],
    ((1200, 900), DetectParams::default())
  );
}

#[test]
fn large_images_are_halved_exactly() {
  let detector = Arc::new(ScriptedDetector::default());
  let (_root, pipeline) = setup(detector.clone());
  let outcome = pipeline.run(&UploadRequest::new("wide.png", png(2400, 1200))).unwrap();
  assert_eq!(outcome.dimensions, (1200, 600));
  assert_eq!(detector.seen.lock().unwrap()[0].0, (1200, 600));

  let saved = image::open(pipeline.store().resolve(&outcome.original)).unwrap();
  assert_eq!((saved.width(), saved.height()), (1200, 600));
}

#[test]
fn zero_faces_leave_output_identical() {
  let (_root, pipeline) = setup(Arc::new(ScriptedDetector::default()));
  let outcome = pipeline.run(&UploadRequest::new("empty.png", png(64, 48))).unwrap();
  assert_eq!(outcome.face_count, 0);
  assert!(outcome.faces.is_empty());

  let original = image::open(pipeline.store().resolve(&outcome.original)).unwrap().to_rgb8();
  let output = image::open(pipeline.store().resolve(&outcome.output)).unwrap().to_rgb8();
  assert_eq!(original, output);
}

#[test]
fn annotations_only_touch_stroke_regions() {
  let boxes = vec![
    BoundingBox::new(4, 4, 20, 20),
    BoundingBox::new(40, 10, 24, 30),
    BoundingBox::new(0, 30, 10, 18),
  ];
  let (_root, pipeline) = setup(Arc::new(ScriptedDetector::with_boxes(boxes.clone())));
  let outcome = pipeline.run(&UploadRequest::new("group.png", png(64, 48))).unwrap();
  assert_eq!(outcome.face_count, 3);

  let annotator = Annotator::default();
  let original = image::open(pipeline.store().resolve(&outcome.original)).unwrap().to_rgb8();
  let output = image::open(pipeline.store().resolve(&outcome.output)).unwrap().to_rgb8();
  for (x, y, pixel) in output.enumerate_pixels() {
    let in_stroke = boxes.iter().any(|b| annotator.stroke_contains(b, x, y));
    if in_stroke {
      assert_eq!(*pixel, annotator.color(), "({}, {})", x, y);
    } else {
      assert_eq!(pixel, original.get_pixel(x, y), "({}, {})", x, y);
    }
  }
}

#[test]
fn identical_filenames_produce_distinct_artifacts() {
  let (_root, pipeline) = setup(Arc::new(ScriptedDetector::default()));
  let first = pipeline.run(&UploadRequest::new("me.jpg", encoded(32, 32, ImageFormat::Jpeg))).unwrap();
  let second = pipeline.run(&UploadRequest::new("me.jpg", encoded(32, 32, ImageFormat::Jpeg))).unwrap();

  assert_ne!(first.original.storage_key, second.original.storage_key);
  assert_ne!(first.output.storage_key, second.output.storage_key);
  assert_eq!(first.output.storage_key, format!("out_{}", first.original.storage_key));
  for locator in [&first.original, &first.output, &second.original, &second.output] {
    assert!(pipeline.store().resolve(locator).is_file());
  }
  assert_eq!(file_count(&pipeline.store().uploads_dir()), 2);
  assert_eq!(file_count(&pipeline.store().outputs_dir()), 2);
}

#[test]
fn pipelines_sharing_a_store_never_collide() {
  let root = tempfile::tempdir().unwrap();
  let store = ArtifactStore::provision(root.path().join("static")).unwrap();
  let pipelines: Vec<_> = (0..2)
    .map(|_| {
      Arc::new(Pipeline::new(
        PipelineConfig::default(),
        Box::new(Arc::new(ScriptedDetector::default())),
        store.clone(),
      ))
    })
    .collect();
  let payload = Arc::new(png(8, 8));

  let handles: Vec<_> = pipelines
    .iter()
    .map(|pipeline| {
      let pipeline = pipeline.clone();
      let payload = payload.clone();
      std::thread::spawn(move || {
        (0..8)
          .map(|_| {
            pipeline
              .run(&UploadRequest::new("same.png", payload.as_ref().clone()))
              .unwrap()
              .original
              .storage_key
          })
          .collect::<Vec<_>>()
      })
    })
    .collect();

  let mut keys = std::collections::HashSet::new();
  for handle in handles {
    for key in handle.join().unwrap() {
      assert!(keys.insert(key));
    }
  }
  assert_eq!(keys.len(), 16);
  assert_eq!(file_count(&store.uploads_dir()), 16);
  assert_eq!(file_count(&store.outputs_dir()), 16);
}

#[test]
fn concurrent_uploads_never_collide() {
  let (_root, pipeline) = setup(Arc::new(ScriptedDetector::with_boxes(vec![BoundingBox::new(
    2, 2, 8, 8,
  )])));
  let pipeline = Arc::new(pipeline);
  let payload = Arc::new(png(16, 16));

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let pipeline = pipeline.clone();
      let payload = payload.clone();
      std::thread::spawn(move || {
        (0..4)
          .map(|_| {
            pipeline
              .run(&UploadRequest::new("same.png", payload.as_ref().clone()))
              .unwrap()
          })
          .collect::<Vec<_>>()
      })
    })
    .collect();

  let mut keys = std::collections::HashSet::new();
  for handle in handles {
    for outcome in handle.join().unwrap() {
      assert_eq!(outcome.face_count, 1);
      assert!(keys.insert(outcome.original.storage_key));
    }
  }
  assert_eq!(keys.len(), 32);
  assert_eq!(file_count(&pipeline.store().uploads_dir()), 32);
  assert_eq!(file_count(&pipeline.store().outputs_dir()), 32);
}
