use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use indicatif::ProgressStyle;
use opencv::core::{self, Mat, ToInputArray, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}")
        .expect("invalid progress bar template")
        .progress_chars("##-")
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| anyhow!("路径不是合法的 UTF-8: {}", path.display()))
}

/// 以单通道灰度模式读取图片，无法解码时返回错误
pub fn imread_gray(path: &Path) -> Result<Mat> {
    let img = imgcodecs::imread(path_str(path)?, imgcodecs::IMREAD_GRAYSCALE)?;
    if img.empty() {
        bail!("无法读取图片: {}", path.display());
    }
    Ok(img)
}

/// 写入图片，格式由扩展名决定
pub fn imwrite(path: &Path, img: &impl ToInputArray) -> Result<()> {
    let flags = Vector::<i32>::new();
    if !imgcodecs::imwrite(path_str(path)?, img, &flags)? {
        bail!("无法写入图片: {}", path.display());
    }
    Ok(())
}

/// 将逗号分隔的后缀名列表转换为不区分大小写的正则表达式
pub fn suffix_regex(suffix: &str) -> Result<Regex> {
    let re = format!("(?i)^({})$", suffix.replace(',', "|"));
    Regex::new(&re).with_context(|| format!("无效的后缀名列表: {}", suffix))
}

fn has_suffix(path: &Path, re: &Regex) -> bool {
    path.extension().is_some_and(|ext| re.is_match(&ext.to_string_lossy()))
}

/// 递归扫描目录下所有符合后缀名的文件
pub fn scan_images(dir: &Path, re: &Regex) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && has_suffix(entry.path(), re))
        .map(|entry| entry.into_path())
        .collect()
}

/// 返回目录下直接包含的图片，按文件名排序
pub fn list_images(dir: &Path, re: &Regex) -> Result<Vec<PathBuf>> {
    let mut images = std::fs::read_dir(dir)
        .with_context(|| format!("无法读取目录: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_suffix(path, re))
        .collect::<Vec<_>>();
    images.sort();
    Ok(images)
}

/// 返回按名称排序的受试者子目录
pub fn subject_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = std::fs::read_dir(dir)
        .with_context(|| format!("无法读取目录: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    dirs.sort();
    Ok(dirs)
}

/// 检查上一阶段的产物是否存在
pub fn require(path: &Path, stage: &str) -> Result<()> {
    if !path.exists() {
        bail!("缺少 {}，请先运行 `{}` 阶段", path.display(), stage);
    }
    Ok(())
}

/// 清空并重新创建输出目录，上一次运行留下的文件不会混入本次结果
pub fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).with_context(|| format!("无法清空 {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir).with_context(|| format!("无法创建 {}", dir.display()))?;
    Ok(())
}

/// 创建一张填充了固定灰度值的单通道图片
pub fn gray_canvas(rows: i32, cols: i32, value: f64) -> Result<Mat> {
    Ok(Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC1, core::Scalar::all(value))?)
}
