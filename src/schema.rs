//! 各阶段产物的文件格式
//!
//! 每种表格只有一种表头，读取时会严格校验；嵌入矩阵与元数据按行对齐，
//! 行数不一致时直接报错。

use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// JSON 产物的格式版本
pub const SCHEMA_VERSION: u32 = 1;

/// 固定表头的 CSV 记录
pub trait Schema: Serialize + DeserializeOwned {
    const HEADER: &'static [&'static str];
}

/// meta.csv 的一行，与 X.npy 的同一行对应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub subject: String,
    pub filename: String,
}

impl Schema for MetaRecord {
    const HEADER: &'static [&'static str] = &["subject", "filename"];
}

/// node_purity.csv 的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePurity {
    pub node: String,
    pub size: usize,
    pub dominant_subject: String,
    pub purity: f64,
}

impl Schema for NodePurity {
    const HEADER: &'static [&'static str] = &["node", "size", "dominant_subject", "purity"];
}

pub fn write_csv<T: Schema>(path: &Path, records: &[T]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("无法创建 {}", path.display()))?;
    // serde 只会在写入第一条记录时输出表头
    if records.is_empty() {
        writer.write_record(T::HEADER)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_csv<T: Schema>(path: &Path) -> Result<Vec<T>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("无法读取 {}", path.display()))?;
    let headers = reader.headers()?.clone();
    if !headers.iter().eq(T::HEADER.iter().copied()) {
        bail!(
            "{} 的表头 [{}] 与预期的 [{}] 不一致",
            path.display(),
            headers.iter().collect::<Vec<_>>().join(","),
            T::HEADER.join(",")
        );
    }
    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(i, record)| record.with_context(|| format!("{} 第 {} 行格式错误", path.display(), i + 2)))
        .collect()
}

pub fn write_matrix(path: &Path, matrix: &Array2<f32>) -> Result<()> {
    write_npy(path, matrix).with_context(|| format!("无法写入 {}", path.display()))
}

/// 读取二维矩阵，`cols` 不为空时校验列数
pub fn read_matrix(path: &Path, cols: Option<usize>) -> Result<Array2<f32>> {
    let matrix: Array2<f32> =
        read_npy(path).with_context(|| format!("无法读取 {}", path.display()))?;
    if let Some(cols) = cols {
        if matrix.ncols() != cols {
            bail!("{} 的列数为 {}，预期为 {}", path.display(), matrix.ncols(), cols);
        }
    }
    Ok(matrix)
}

/// 读取按行对齐的矩阵和元数据
pub fn read_aligned(
    matrix_path: &Path,
    meta_path: &Path,
    cols: Option<usize>,
) -> Result<(Array2<f32>, Vec<MetaRecord>)> {
    let matrix = read_matrix(matrix_path, cols)?;
    let meta = read_csv::<MetaRecord>(meta_path)?;
    if matrix.nrows() != meta.len() {
        bail!(
            "{} 有 {} 行，而 {} 有 {} 行，两者必须逐行对应",
            matrix_path.display(),
            matrix.nrows(),
            meta_path.display(),
            meta.len()
        );
    }
    Ok((matrix, meta))
}

pub fn check_version(version: u32, path: &Path) -> Result<()> {
    if version != SCHEMA_VERSION {
        bail!("{} 的格式版本为 {}，当前只支持 {}", path.display(), version, SCHEMA_VERSION);
    }
    Ok(())
}
