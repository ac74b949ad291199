use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};

/// Face region reported by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: left eye, right eye, nose, mouth left, mouth right
}

impl Detection {
    /// Detection covering `bbox` with no landmark information.
    pub fn from_bbox(bbox: [f32; 4], score: f32) -> Self {
        Self {
            bbox,
            score,
            landmarks: [0.0; 10],
        }
    }
}

/// Fixed-length face descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    /// Euclidean distance. Vectors of different length compare as infinitely far apart.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.vector.len() != other.vector.len() {
            return f32::INFINITY;
        }
        self.vector
            .iter()
            .zip(&other.vector)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    /// Scale to unit L2 norm in place. Zero vectors are left untouched.
    pub fn normalize(&mut self) {
        let norm = self.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            self.vector.iter_mut().for_each(|x| *x /= norm);
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

/// Face detection and embedding collaborator.
///
/// Implementations are expected to behave as pure functions of their input
/// image; `&mut self` only exists because inference sessions need it.
pub trait FaceEngine {
    /// All faces found in `image`, possibly none.
    fn detect_faces(&mut self, image: &DynamicImage) -> Result<Vec<Detection>>;

    /// Descriptor for the face at `face` inside `image`.
    fn compute_embedding(&mut self, image: &DynamicImage, face: &Detection) -> Result<Embedding>;
}

impl<E: FaceEngine + ?Sized> FaceEngine for Box<E> {
    fn detect_faces(&mut self, image: &DynamicImage) -> Result<Vec<Detection>> {
        (**self).detect_faces(image)
    }

    fn compute_embedding(&mut self, image: &DynamicImage, face: &Detection) -> Result<Embedding> {
        (**self).compute_embedding(image, face)
    }
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

// Eye positions of the canonical 112x112 SFace/ArcFace crop.
const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);
const REF_SIZE: f32 = 112.0;

/// Rotate, scale and crop so the eyes land on the canonical positions of a
/// `size` x `size` crop.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist <= f32::EPSILON {
        anyhow::bail!("degenerate landmarks: eyes coincide");
    }

    let ref_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2)
        + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2))
    .sqrt();
    let out_scale = size as f32 / REF_SIZE;
    let scale = out_scale * ref_dist / eye_dist;
    let angle = dy.atan2(dx);
    let (sin, cos) = angle.sin_cos();

    // Forward transform: out = M * in + t
    let (a, b, c, d) = (scale * cos, scale * sin, -scale * sin, scale * cos);
    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let target = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * out_scale,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * out_scale,
    );
    let tx = target.0 - (a * center.0 + b * center.1);
    let ty = target.1 - (c * center.0 + d * center.1);
    let det = a * d - b * c;

    let src = img.to_rgb8();
    let mut output = RgbImage::new(size, size);
    for (ox, oy, pixel) in output.enumerate_pixels_mut() {
        let px = ox as f32 - tx;
        let py = oy as f32 - ty;
        let ix = (d * px - b * py) / det;
        let iy = (-c * px + a * py) / det;
        if let Some(sample) = bilinear(&src, ix, iy) {
            *pixel = sample;
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let corners = [
        (img.get_pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (img.get_pixel(x1, y0), fx * (1.0 - fy)),
        (img.get_pixel(x0, y1), (1.0 - fx) * fy),
        (img.get_pixel(x1, y1), fx * fy),
    ];
    let mut out = [0u8; 3];
    for (ch, value) in out.iter_mut().enumerate() {
        let v: f32 = corners.iter().map(|(p, w)| p[ch] as f32 * w).sum();
        *value = v.round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);

        let c = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(compute_iou(&a, &c), 0.0);
    }

    #[test]
    fn test_nms() {
        let detections = vec![
            Detection::from_bbox([10.0, 10.0, 20.0, 20.0], 0.9),
            Detection::from_bbox([12.0, 12.0, 20.0, 20.0], 0.8),
            Detection::from_bbox([100.0, 100.0, 20.0, 20.0], 0.85),
        ];

        let result = nms(&detections, 0.3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.85);
    }

    #[test]
    fn test_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
        assert_eq!(a.distance(&Embedding::new(vec![0.0])), f32::INFINITY);
    }

    #[test]
    fn test_normalize() {
        let mut e = Embedding::new(vec![3.0, 4.0]);
        e.normalize();
        assert!((e.vector[0] - 0.6).abs() < 1e-6);
        assert!((e.vector[1] - 0.8).abs() < 1e-6);

        let mut zero = Embedding::new(vec![0.0, 0.0]);
        zero.normalize();
        assert_eq!(zero.vector, vec![0.0, 0.0]);
    }

    #[test]
    fn test_align_face_output_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 200, Rgb([120, 80, 40])));
        let mut det = Detection::from_bbox([50.0, 50.0, 100.0, 100.0], 0.9);
        det.landmarks[..4].copy_from_slice(&[80.0, 90.0, 120.0, 90.0]);

        let aligned = align_face(&img, &det, 112).unwrap();
        assert_eq!(aligned.dimensions(), (112, 112));
        // Eye midpoint maps inside the source, so the crop centre is sampled.
        assert_eq!(aligned.to_rgb8().get_pixel(56, 51).0, [120, 80, 40]);
    }

    #[test]
    fn test_align_face_rejects_degenerate_landmarks() {
        let img = DynamicImage::new_rgb8(10, 10);
        let det = Detection::from_bbox([0.0, 0.0, 5.0, 5.0], 0.9);
        assert!(align_face(&img, &det, 112).is_err());
    }
}
