use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::face::{self, Detection, Embedding, FaceEngine};
use crate::yunet;

const DETECTOR_INPUT: u32 = 640;
const ENCODER_INPUT: u32 = 112;

/// YuNet detector followed by SFace encoder, both run through ONNX Runtime.
pub struct OnnxEngine {
    detector: Session,
    encoder: Session,
    score_threshold: f32,
    nms_threshold: f32,
}

impl OnnxEngine {
    pub fn load(detector: &Path, encoder: &Path) -> Result<Self> {
        Ok(Self {
            detector: crate::model::load_session(detector).context("load detector")?,
            encoder: crate::model::load_session(encoder).context("load encoder")?,
            score_threshold: 0.6,
            nms_threshold: 0.3,
        })
    }

    pub fn with_thresholds(mut self, score: f32, nms: f32) -> Self {
        self.score_threshold = score;
        self.nms_threshold = nms;
        self
    }
}

impl FaceEngine for OnnxEngine {
    fn detect_faces(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        // Letterbox onto a square canvas so the aspect ratio survives the resize
        let (width, height) = img.dimensions();
        let scale = DETECTOR_INPUT as f32 / width.max(height) as f32;
        let resized_w = ((width as f32 * scale) as u32).max(1);
        let resized_h = ((height as f32 * scale) as u32).max(1);
        let resized = img.resize_exact(resized_w, resized_h, image::imageops::FilterType::Triangle);
        let offset_x = (DETECTOR_INPUT - resized_w) / 2;
        let offset_y = (DETECTOR_INPUT - resized_h) / 2;
        let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
        image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

        let input = Value::from_array(bgr_planar(&canvas.to_rgb8())?)?;
        let outputs = self.detector.run(ort::inputs![input])?;

        let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::with_capacity(12);
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            tensors.push((shape.iter().copied().collect(), data.to_vec()));
        }
        let refs: Vec<(&[i64], &[f32])> = tensors
            .iter()
            .map(|(s, d)| (s.as_slice(), d.as_slice()))
            .collect();

        let scales = yunet::parse_outputs(&refs, DETECTOR_INPUT as usize)?;
        let raw = yunet::decode(&scales, self.score_threshold, DETECTOR_INPUT as usize);

        // Undo the letterbox: canvas pixels back to source pixels
        let unmap_x = |x: f32| (x - offset_x as f32) / scale;
        let unmap_y = |y: f32| (y - offset_y as f32) / scale;
        let detections: Vec<Detection> = raw
            .into_iter()
            .map(|d| {
                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = unmap_x(d.landmarks[k * 2]);
                    landmarks[k * 2 + 1] = unmap_y(d.landmarks[k * 2 + 1]);
                }
                Detection {
                    bbox: [
                        unmap_x(d.bbox[0]),
                        unmap_y(d.bbox[1]),
                        d.bbox[2] / scale,
                        d.bbox[3] / scale,
                    ],
                    score: d.score,
                    landmarks,
                }
            })
            .collect();

        let kept = face::nms(&detections, self.nms_threshold);
        log::debug!("detector: {} raw, {} after nms", detections.len(), kept.len());
        Ok(kept)
    }

    fn compute_embedding(
        &mut self,
        img: &DynamicImage,
        detection: &Detection,
    ) -> Result<Embedding> {
        let aligned = face::align_face(img, detection, ENCODER_INPUT).context("aligning face")?;
        let input = Value::from_array(bgr_planar(&aligned.to_rgb8())?)?;
        let outputs = self.encoder.run(ort::inputs![input])?;
        let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        let mut embedding = Embedding::new(data.to_vec());
        embedding.normalize();
        Ok(embedding)
    }
}

/// `[1, 3, H, W]` tensor in BGR channel order with raw 0-255 values, as both
/// YuNet and SFace expect.
fn bgr_planar(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        data[i] = px[2] as f32;
        data[plane + i] = px[1] as f32;
        data[2 * plane + i] = px[0] as f32;
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}
