//! Geometric calibration for the depth-and-motion camera.
//!
//! The device ships a JSON calibration document describing the fisheye
//! imager, the IMU, and the rigid transforms between the sensor frames.
//! This module parses it into typed intrinsics/extrinsics; the per-stream
//! extrinsics are derived with rigid-pose algebra from the two transforms
//! stored in the document (IMU->fisheye at the root, IMU->depth under the
//! `depth` key).

use crate::{MotionCamError, Result};
use serde_json::Value;
use std::path::Path;

/// Default location of the calibration document on the device image.
pub const DEFAULT_CALIBRATION_PATH: &str = "/etc/motioncam/calibration.json";

/// Rigid transform between two sensor coordinate frames.
///
/// `rotation` is row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        translation: [0.0, 0.0, 0.0],
    };

    /// Inverse transform: R' = R^T, t' = -R^T t.
    pub fn inverse(&self) -> Pose {
        let r = &self.rotation;
        let rt = [
            [r[0][0], r[1][0], r[2][0]],
            [r[0][1], r[1][1], r[2][1]],
            [r[0][2], r[1][2], r[2][2]],
        ];
        let t = &self.translation;
        let translation = [
            -(rt[0][0] * t[0] + rt[0][1] * t[1] + rt[0][2] * t[2]),
            -(rt[1][0] * t[0] + rt[1][1] * t[1] + rt[1][2] * t[2]),
            -(rt[2][0] * t[0] + rt[2][1] * t[1] + rt[2][2] * t[2]),
        ];
        Pose {
            rotation: rt,
            translation,
        }
    }

    /// Composition `self * other`: rotation chains, `other`'s translation
    /// is rotated into `self`'s frame and offset.
    pub fn compose(&self, other: &Pose) -> Pose {
        let a = &self.rotation;
        let b = &other.rotation;
        let mut rotation = [[0.0; 3]; 3];
        for (i, row) in rotation.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        let bt = &other.translation;
        let translation = [
            a[0][0] * bt[0] + a[0][1] * bt[1] + a[0][2] * bt[2] + self.translation[0],
            a[1][0] * bt[0] + a[1][1] * bt[1] + a[1][2] * bt[2] + self.translation[1],
            a[2][0] * bt[0] + a[2][1] * bt[1] + a[2][2] * bt[2] + self.translation[2],
        ];
        Pose {
            rotation,
            translation,
        }
    }
}

/// Rotation (3x3, column-major) and translation between two sensor frames,
/// in the layout consumed by downstream point-cloud code.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Extrinsics {
    pub rotation: [f32; 9],
    pub translation: [f32; 3],
}

impl From<Pose> for Extrinsics {
    fn from(pose: Pose) -> Extrinsics {
        let mut rotation = [0.0f32; 9];
        for col in 0..3 {
            for row in 0..3 {
                rotation[col * 3 + row] = pose.rotation[row][col] as f32;
            }
        }
        Extrinsics {
            rotation,
            translation: [
                pose.translation[0] as f32,
                pose.translation[1] as f32,
                pose.translation[2] as f32,
            ],
        }
    }
}

/// Pinhole intrinsics for the fisheye imager.
///
/// `k` is the 3x3 camera matrix in row-major order; `distortion` holds the
/// fisheye distortion coefficient in slot 0, remaining slots zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Intrinsics {
    pub k: [f64; 9],
    pub distortion: [f64; 5],
}

impl Intrinsics {
    pub fn fx(&self) -> f64 {
        self.k[0]
    }

    pub fn fy(&self) -> f64 {
        self.k[4]
    }

    pub fn ppx(&self) -> f64 {
        self.k[2]
    }

    pub fn ppy(&self) -> f64 {
        self.k[5]
    }
}

/// Scale/cross-axis/bias model for one motion sensor.
///
/// `data` is a 3x4 transform: the left 3x3 block holds scale and
/// cross-axis terms, column 3 holds the bias vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSensorIntrinsics {
    pub data: [[f64; 4]; 3],
    pub bias_variance: [f64; 3],
    pub noise_variance: [f64; 3],
}

/// IMU intrinsics: accelerometer and gyroscope models.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionIntrinsics {
    pub accel: MotionSensorIntrinsics,
    pub gyro: MotionSensorIntrinsics,
}

/// Rigid transforms between the camera's sensor frames.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionExtrinsics {
    pub fisheye_to_imu: Extrinsics,
    pub fisheye_to_depth: Extrinsics,
    pub depth_to_imu: Extrinsics,
    pub rgb_to_imu: Extrinsics,
}

/// Full calibration of the motion module and its geometric relation to
/// the video streams.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionModuleCalibration {
    pub fisheye: Intrinsics,
    pub imu: MotionIntrinsics,
    pub extrinsics: MotionExtrinsics,
}

impl MotionModuleCalibration {
    /// Load and parse the calibration document from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<MotionModuleCalibration> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse the calibration document from JSON text.
    pub fn from_json_str(text: &str) -> Result<MotionModuleCalibration> {
        let doc: Value = serde_json::from_str(text)?;

        let fisheye = parse_fisheye_intrinsics(&doc)?;
        let imu = parse_motion_intrinsics(&doc)?;

        let imu_to_fisheye = parse_pose(&doc)?;
        let depth = doc
            .get("depth")
            .ok_or(MotionCamError::CalibrationField("depth"))?;
        let imu_to_depth = parse_pose(depth)?;

        let fisheye_to_imu = imu_to_fisheye.inverse();
        let fisheye_to_depth = imu_to_fisheye.inverse().compose(&imu_to_depth);
        let depth_to_imu = imu_to_depth.inverse();

        let extrinsics = MotionExtrinsics {
            fisheye_to_imu: fisheye_to_imu.into(),
            fisheye_to_depth: fisheye_to_depth.into(),
            depth_to_imu: depth_to_imu.into(),
            // The RGB imager sits on the same board as the depth imager;
            // the document carries no separate transform for it.
            rgb_to_imu: depth_to_imu.into(),
        };

        log::info!(
            "calibration loaded: fisheye f=({:.1},{:.1}) pp=({:.1},{:.1})",
            fisheye.fx(),
            fisheye.fy(),
            fisheye.ppx(),
            fisheye.ppy()
        );

        Ok(MotionModuleCalibration {
            fisheye,
            imu,
            extrinsics,
        })
    }
}

fn field_f64(doc: &Value, name: &'static str) -> Result<f64> {
    doc.get(name)
        .and_then(Value::as_f64)
        .ok_or(MotionCamError::CalibrationField(name))
}

fn array9(doc: &Value, name: &'static str) -> Result<[f64; 9]> {
    let values = doc
        .get(name)
        .and_then(Value::as_array)
        .ok_or(MotionCamError::CalibrationField(name))?;
    if values.len() < 9 {
        return Err(MotionCamError::CalibrationField(name));
    }
    let mut out = [0.0; 9];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = value
            .as_f64()
            .ok_or(MotionCamError::CalibrationField(name))?;
    }
    Ok(out)
}

fn parse_fisheye_intrinsics(doc: &Value) -> Result<Intrinsics> {
    let cx = field_f64(doc, "Cx")?;
    let cy = field_f64(doc, "Cy")?;
    let fx = field_f64(doc, "Fx")?;
    let fy = field_f64(doc, "Fy")?;
    let kw = field_f64(doc, "Kw")?;

    Ok(Intrinsics {
        k: [fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0],
        distortion: [kw, 0.0, 0.0, 0.0, 0.0],
    })
}

fn parse_motion_intrinsics(doc: &Value) -> Result<MotionIntrinsics> {
    let accel = parse_sensor_intrinsics(
        doc,
        "accelerometerTransform",
        ["abias0", "abias1", "abias2"],
        ["abiasvar0", "abiasvar1", "abiasvar2"],
        "aMeasVar",
    )?;
    let gyro = parse_sensor_intrinsics(
        doc,
        "gyroscopeTransform",
        ["wbias0", "wbias1", "wbias2"],
        ["wbiasvar0", "wbiasvar1", "wbiasvar2"],
        "wMeasVar",
    )?;
    Ok(MotionIntrinsics { accel, gyro })
}

fn parse_sensor_intrinsics(
    doc: &Value,
    transform_key: &'static str,
    bias_keys: [&'static str; 3],
    bias_var_keys: [&'static str; 3],
    noise_var_key: &'static str,
) -> Result<MotionSensorIntrinsics> {
    // The transform array is column-major: elements 0..3 are column 0.
    let scale = array9(doc, transform_key)?;
    let mut data = [[0.0; 4]; 3];
    for col in 0..3 {
        for row in 0..3 {
            data[row][col] = scale[col * 3 + row];
        }
    }
    for (row, key) in bias_keys.iter().enumerate() {
        data[row][3] = field_f64(doc, key)?;
    }

    let mut bias_variance = [0.0; 3];
    for (slot, key) in bias_variance.iter_mut().zip(bias_var_keys) {
        *slot = field_f64(doc, key)?;
    }
    let noise = field_f64(doc, noise_var_key)?;

    Ok(MotionSensorIntrinsics {
        data,
        bias_variance,
        noise_variance: [noise; 3],
    })
}

/// Read a pose stored as flat `Rot0..Rot8` (column-major) and `Tc0..Tc2`
/// fields of `doc`.
fn parse_pose(doc: &Value) -> Result<Pose> {
    const ROT_KEYS: [&str; 9] = [
        "Rot0", "Rot1", "Rot2", "Rot3", "Rot4", "Rot5", "Rot6", "Rot7", "Rot8",
    ];
    const TC_KEYS: [&str; 3] = ["Tc0", "Tc1", "Tc2"];

    let mut rotation = [[0.0; 3]; 3];
    for (i, key) in ROT_KEYS.iter().enumerate() {
        let value = doc
            .get(*key)
            .and_then(Value::as_f64)
            .ok_or(MotionCamError::CalibrationField("Rot0..Rot8"))?;
        rotation[i % 3][i / 3] = value;
    }

    let mut translation = [0.0; 3];
    for (slot, key) in translation.iter_mut().zip(TC_KEYS) {
        *slot = doc
            .get(key)
            .and_then(Value::as_f64)
            .ok_or(MotionCamError::CalibrationField("Tc0..Tc2"))?;
    }

    Ok(Pose {
        rotation,
        translation,
    })
}
