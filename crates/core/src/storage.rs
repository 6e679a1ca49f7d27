//! Vector storage: typed point containers with per-point label sets.
//!
//! [`Storage<T>`] owns one contiguous `N·D` element buffer plus one
//! [`LabelSet`] per point. The element type is one of the sealed
//! [`Element`] implementations (`f32`, `i8`, `u8`); [`AnyStorage`] is the
//! non-generic façade that dispatches on [`DataType`], created through
//! [`AnyStorage::load`].
//!
//! The on-disk vector format is a `{N:u32, D:u32}` little-endian header
//! followed by `N·D` raw elements. Labels are a text file with one
//! comma-separated line per point; a missing label file degrades every
//! point to the single label `{1}` (unfiltered search).

use crate::config;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::labels::LabelSet;
use crate::IdxType;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

/// Element type tag of a vector file or index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Float32,
    Int8,
    UInt8,
}

impl std::str::FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float" => Ok(DataType::Float32),
            "int8" => Ok(DataType::Int8),
            "uint8" => Ok(DataType::UInt8),
            other => Err(Error::Config(format!("unknown data type '{other}'"))),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Float32 => write!(f, "float"),
            DataType::Int8 => write!(f, "int8"),
            DataType::UInt8 => write!(f, "uint8"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for i8 {}
    impl Sealed for u8 {}
}

/// Sealed vector element type. Implemented for `f32`, `i8`, and `u8` only;
/// the distance kernels monomorphize over this trait.
pub trait Element: sealed::Sealed + Copy + Default + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    const BYTES: usize;

    fn from_le_bytes(raw: &[u8]) -> Self;
    fn write_le(self, out: &mut Vec<u8>);
    fn to_f32(self) -> f32;
}

impl Element for f32 {
    const DATA_TYPE: DataType = DataType::Float32;
    const BYTES: usize = 4;

    #[inline]
    fn from_le_bytes(raw: &[u8]) -> Self {
        f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for i8 {
    const DATA_TYPE: DataType = DataType::Int8;
    const BYTES: usize = 1;

    #[inline]
    fn from_le_bytes(raw: &[u8]) -> Self {
        raw[0] as i8
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Element for u8 {
    const DATA_TYPE: DataType = DataType::UInt8;
    const BYTES: usize = 1;

    #[inline]
    fn from_le_bytes(raw: &[u8]) -> Self {
        raw[0]
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

/// Portable software prefetch hint (L1 cache, read).
/// No-op on unsupported platforms.
#[inline(always)]
fn prefetch_read(ptr: *const u8) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        std::arch::asm!(
            "prfm pldl1keep, [{ptr}]",
            ptr = in(reg) ptr,
            options(nostack, preserves_flags)
        );
    }
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_mm_prefetch(ptr as *const i8, std::arch::x86_64::_MM_HINT_T0);
    }
}

/// Owning container for `N` vectors of dimension `D` plus per-point labels.
///
/// Populated by [`Storage::load`], then immutable during build except for
/// one [`Storage::reorder`] call that makes same-label-set points
/// contiguous.
#[derive(Debug, Clone, Default)]
pub struct Storage<T: Element> {
    vecs: Vec<T>,
    label_sets: Vec<LabelSet>,
    num_points: IdxType,
    dim: IdxType,
}

impl<T: Element> Storage<T> {
    /// Builds a storage directly from rows and label sets. Rows must all
    /// have the same dimension.
    pub fn from_rows(rows: &[Vec<T>], label_sets: Vec<LabelSet>) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::Data("cannot build storage from zero rows".into()));
        }
        if rows.len() != label_sets.len() {
            return Err(Error::Data(format!(
                "row count {} != label set count {}",
                rows.len(),
                label_sets.len()
            )));
        }
        let dim = rows[0].len();
        let mut vecs = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(Error::Data(format!(
                    "row {i} has dimension {} but expected {dim}",
                    row.len()
                )));
            }
            vecs.extend_from_slice(row);
        }
        Ok(Self {
            vecs,
            label_sets,
            num_points: rows.len() as IdxType,
            dim: dim as IdxType,
        })
    }

    /// Loads vectors and labels from disk.
    ///
    /// `vec_path` holds the `{N:u32, D:u32}` header followed by `N·D`
    /// little-endian elements; at most `max_points` points are kept. If
    /// `label_path` does not exist every point is assigned the label set
    /// `{1}` and a warning is logged.
    pub fn load(vec_path: &Path, label_path: &Path, max_points: IdxType) -> Result<Self> {
        let raw = std::fs::read(vec_path)?;
        if raw.len() < 8 {
            return Err(Error::Format(format!(
                "vector file {} too short for header",
                vec_path.display()
            )));
        }
        let n_file = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let dim = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if dim == 0 {
            return Err(Error::Format(format!(
                "vector file {} declares dimension 0",
                vec_path.display()
            )));
        }
        let num_points = n_file.min(max_points);

        let expected = num_points as usize * dim as usize * T::BYTES;
        let payload = &raw[8..];
        if payload.len() < expected {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "short read in {}: expected {expected} element bytes, got {}",
                    vec_path.display(),
                    payload.len()
                ),
            )));
        }
        let mut vecs = Vec::with_capacity(num_points as usize * dim as usize);
        for chunk in payload[..expected].chunks_exact(T::BYTES) {
            vecs.push(T::from_le_bytes(chunk));
        }

        let label_sets = match std::fs::read_to_string(label_path) {
            Ok(text) => {
                let mut sets = Vec::with_capacity(num_points as usize);
                let mut lines = text.lines();
                for _ in 0..num_points {
                    let line = lines.next().unwrap_or("");
                    sets.push(LabelSet::parse_line(line)?);
                }
                sets
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    "label file {} not found, assigning label {{{}}} to all points",
                    label_path.display(),
                    config::UNLABELED_LABEL
                );
                vec![LabelSet::new(vec![config::UNLABELED_LABEL]); num_points as usize]
            }
            Err(e) => return Err(Error::Io(e)),
        };

        tracing::info!(
            "loaded {} points of dimension {} ({}) from {}",
            num_points,
            dim,
            T::DATA_TYPE,
            vec_path.display()
        );
        Ok(Self {
            vecs,
            label_sets,
            num_points,
            dim,
        })
    }

    /// Writes vectors and labels back in the load formats.
    pub fn write(&self, vec_path: &Path, label_path: &Path) -> Result<()> {
        let mut out = Vec::with_capacity(8 + self.vecs.len() * T::BYTES);
        out.extend_from_slice(&self.num_points.to_le_bytes());
        out.extend_from_slice(&self.dim.to_le_bytes());
        for &v in &self.vecs {
            v.write_le(&mut out);
        }
        std::fs::write(vec_path, out)?;

        let mut text = String::new();
        for set in &self.label_sets {
            text.push_str(&set.to_string());
            text.push('\n');
        }
        std::fs::write(label_path, text)?;
        Ok(())
    }

    pub fn num_points(&self) -> IdxType {
        self.num_points
    }

    pub fn dim(&self) -> IdxType {
        self.dim
    }

    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    /// Vector of the given point. O(1) slice into the contiguous buffer.
    #[inline]
    pub fn vector(&self, id: IdxType) -> &[T] {
        let dim = self.dim as usize;
        let start = id as usize * dim;
        &self.vecs[start..start + dim]
    }

    #[inline]
    pub fn labels(&self, id: IdxType) -> &LabelSet {
        &self.label_sets[id as usize]
    }

    pub fn label_sets(&self) -> &[LabelSet] {
        &self.label_sets
    }

    /// Prefetches a point's vector into L1 ahead of a distance computation.
    #[inline(always)]
    pub fn prefetch(&self, id: IdxType) {
        let dim = self.dim as usize;
        let start = id as usize * dim;
        if start < self.vecs.len() {
            let ptr = self.vecs[start..].as_ptr() as *const u8;
            prefetch_read(ptr);
            if dim * T::BYTES > 64 {
                prefetch_read(unsafe { ptr.add(64) });
            }
        }
    }

    /// Applies a new-to-old permutation in place: row `i` of the reordered
    /// storage is row `new_to_old[i]` of the current one.
    pub fn reorder(&mut self, new_to_old: &[IdxType]) -> Result<()> {
        if new_to_old.len() != self.num_points as usize {
            return Err(Error::Data(format!(
                "permutation length {} != {} points",
                new_to_old.len(),
                self.num_points
            )));
        }
        let dim = self.dim as usize;
        let mut new_vecs = Vec::with_capacity(self.vecs.len());
        let mut new_labels = Vec::with_capacity(self.label_sets.len());
        for &old in new_to_old {
            new_vecs.extend_from_slice(self.vector(old));
            new_labels.push(self.label_sets[old as usize].clone());
        }
        debug_assert_eq!(new_vecs.len(), self.num_points as usize * dim);
        self.vecs = new_vecs;
        self.label_sets = new_labels;
        Ok(())
    }

    /// Borrowing view of the id range `[lo, hi)`. The view indexes with
    /// range-local ids and cannot outlive this storage.
    pub fn slice(&self, lo: IdxType, hi: IdxType) -> StorageView<'_, T> {
        let dim = self.dim as usize;
        StorageView {
            vecs: &self.vecs[lo as usize * dim..hi as usize * dim],
            label_sets: &self.label_sets[lo as usize..hi as usize],
            dim,
        }
    }

    /// View of the full id range.
    pub fn view(&self) -> StorageView<'_, T> {
        self.slice(0, self.num_points)
    }
}

/// Non-owning row-range view over a [`Storage`].
#[derive(Debug, Clone, Copy)]
pub struct StorageView<'a, T: Element> {
    vecs: &'a [T],
    label_sets: &'a [LabelSet],
    dim: usize,
}

impl<'a, T: Element> StorageView<'a, T> {
    pub fn num_points(&self) -> IdxType {
        self.label_sets.len() as IdxType
    }

    pub fn dim(&self) -> IdxType {
        self.dim as IdxType
    }

    #[inline]
    pub fn vector(&self, local_id: IdxType) -> &'a [T] {
        let start = local_id as usize * self.dim;
        &self.vecs[start..start + self.dim]
    }

    #[inline]
    pub fn labels(&self, local_id: IdxType) -> &'a LabelSet {
        &self.label_sets[local_id as usize]
    }

    /// The in-range point closest to the element-wise mean of the range,
    /// under the given metric. Distance evaluations run in parallel; ties
    /// break toward the smaller id.
    pub fn medoid(&self, metric: DistanceMetric) -> IdxType {
        let n = self.num_points();
        debug_assert!(n > 0);
        let mut center = vec![0f32; self.dim];
        for id in 0..n {
            for (c, v) in center.iter_mut().zip(self.vector(id)) {
                *c += v.to_f32();
            }
        }
        for c in &mut center {
            *c /= n as f32;
        }

        let (best, _) = (0..n)
            .into_par_iter()
            .map(|id| (id, metric.compute_asym(&center, self.vector(id))))
            .reduce(
                || (IdxType::MAX, f32::MAX),
                |a, b| {
                    if b.1 < a.1 || (b.1 == a.1 && b.0 < a.0) {
                        b
                    } else {
                        a
                    }
                },
            );
        best
    }
}

/// Type-erased storage façade. Holds one of the three element
/// instantiations and dispatches on the [`DataType`] tag.
#[derive(Debug, Clone)]
pub enum AnyStorage {
    Float32(Storage<f32>),
    Int8(Storage<i8>),
    UInt8(Storage<u8>),
}

impl AnyStorage {
    /// Factory: loads a storage of the requested element type.
    pub fn load(
        data_type: DataType,
        vec_path: &Path,
        label_path: &Path,
        max_points: IdxType,
    ) -> Result<Self> {
        match data_type {
            DataType::Float32 => Storage::load(vec_path, label_path, max_points).map(Self::Float32),
            DataType::Int8 => Storage::load(vec_path, label_path, max_points).map(Self::Int8),
            DataType::UInt8 => Storage::load(vec_path, label_path, max_points).map(Self::UInt8),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            AnyStorage::Float32(_) => DataType::Float32,
            AnyStorage::Int8(_) => DataType::Int8,
            AnyStorage::UInt8(_) => DataType::UInt8,
        }
    }

    pub fn num_points(&self) -> IdxType {
        match self {
            AnyStorage::Float32(s) => s.num_points(),
            AnyStorage::Int8(s) => s.num_points(),
            AnyStorage::UInt8(s) => s.num_points(),
        }
    }

    pub fn dim(&self) -> IdxType {
        match self {
            AnyStorage::Float32(s) => s.dim(),
            AnyStorage::Int8(s) => s.dim(),
            AnyStorage::UInt8(s) => s.dim(),
        }
    }
}
