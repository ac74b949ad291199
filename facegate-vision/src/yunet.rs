//! YuNet detector post-processing.
//!
//! YuNet is anchor-free. For each stride (8, 16, 32) the network emits four
//! tensors over an `(input / stride)^2` grid, in this output order:
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, bbox_16, bbox_32,
//! kps_8, kps_16, kps_32`.
//!
//! Per grid cell `(row, col)`:
//! - score = sqrt(cls * obj), both clamped to [0, 1]
//! - centre = ((col + dx) * stride, (row + dy) * stride)
//! - size = (exp(dw) * stride, exp(dh) * stride)
//! - landmark k = ((col + lx_k) * stride, (row + ly_k) * stride)

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView2};

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Detection in input-canvas pixel coordinates.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Network outputs for a single stride.
#[derive(Debug)]
pub struct ScaleOutput {
    pub stride: usize,
    pub cls: Array2<f32>,
    pub obj: Array2<f32>,
    pub bbox: Array2<f32>,
    pub kps: Array2<f32>,
}

/// Group the twelve raw output tensors by stride, checking their shapes.
pub fn parse_outputs(outputs: &[(&[i64], &[f32])], input_size: usize) -> Result<Vec<ScaleOutput>> {
    if outputs.len() < 12 {
        anyhow::bail!("expected 12 YuNet outputs, got {}", outputs.len());
    }

    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let cells = (input_size / stride).pow(2);
            Ok(ScaleOutput {
                stride,
                cls: tensor(outputs[i], cells, 1).context("cls")?,
                obj: tensor(outputs[i + 3], cells, 1).context("obj")?,
                bbox: tensor(outputs[i + 6], cells, 4).context("bbox")?,
                kps: tensor(outputs[i + 9], cells, 10).context("kps")?,
            })
        })
        .collect()
}

fn tensor((shape, data): (&[i64], &[f32]), cells: usize, width: usize) -> Result<Array2<f32>> {
    let expected = [1, cells as i64, width as i64];
    if shape != expected.as_slice() {
        anyhow::bail!("unexpected shape {:?}, expected {:?}", shape, expected);
    }
    Ok(Array2::from_shape_vec((cells, width), data.to_vec())?)
}

/// Decode every grid cell scoring at least `score_threshold`.
pub fn decode(
    scales: &[ScaleOutput],
    score_threshold: f32,
    input_size: usize,
) -> Vec<RawDetection> {
    let mut detections = Vec::new();
    for scale in scales {
        decode_scale(scale, score_threshold, input_size, &mut detections);
    }
    detections
}

fn decode_scale(
    scale: &ScaleOutput,
    score_threshold: f32,
    input_size: usize,
    out: &mut Vec<RawDetection>,
) {
    let cols = input_size / scale.stride;
    let stride = scale.stride as f32;
    let bbox: ArrayView2<f32> = scale.bbox.view();

    for idx in 0..scale.cls.nrows() {
        let cls = scale.cls[[idx, 0]].clamp(0.0, 1.0);
        let obj = scale.obj[[idx, 0]].clamp(0.0, 1.0);
        let score = (cls * obj).sqrt();
        if score < score_threshold {
            continue;
        }

        let row = (idx / cols) as f32;
        let col = (idx % cols) as f32;
        let cx = (col + bbox[[idx, 0]]) * stride;
        let cy = (row + bbox[[idx, 1]]) * stride;
        let w = bbox[[idx, 2]].exp() * stride;
        let h = bbox[[idx, 3]].exp() * stride;

        let mut landmarks = [0.0f32; 10];
        for k in 0..5 {
            landmarks[k * 2] = (col + scale.kps[[idx, k * 2]]) * stride;
            landmarks[k * 2 + 1] = (row + scale.kps[[idx, k * 2 + 1]]) * stride;
        }

        out.push(RawDetection {
            bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
            score,
            landmarks,
        });
    }
}
