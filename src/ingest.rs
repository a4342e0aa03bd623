use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use indicatif::{ProgressBar, ProgressIterator};
use log::{info, warn};
use regex::Regex;

use crate::utils::{self, pb_style};

/// 一张整理后的指纹图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub subject_id: String,
    /// 受试者内从 1 开始的连续编号
    pub sequence_index: usize,
    pub file_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub samples: Vec<Sample>,
    /// 无法读取而被跳过的原始文件
    pub skipped: Vec<PathBuf>,
}

impl IngestSummary {
    pub fn subject_count(&self) -> usize {
        let mut subjects = self.samples.iter().map(|s| &s.subject_id).collect::<Vec<_>>();
        subjects.dedup();
        subjects.len()
    }
}

/// 从文件名中取出受试者编号，如 `101_1.tif` 对应 `101`
pub fn subject_of(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let id = stem.split('_').next()?;
    (!id.is_empty()).then(|| id.to_owned())
}

/// 按受试者分组，组内按文件名排序
pub fn group_by_subject(paths: Vec<PathBuf>) -> BTreeMap<String, Vec<PathBuf>> {
    let mut subjects: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in paths {
        match subject_of(&path) {
            Some(subject) => subjects.entry(subject).or_default().push(path),
            None => warn!("无法从文件名识别受试者，跳过: {}", path.display()),
        }
    }
    for images in subjects.values_mut() {
        images.sort_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)));
    }
    subjects
}

/// 将原始图片整理为 `subjectNNN/img_NNN.png` 结构的灰度图片
pub fn ingest(raw_dir: &Path, out_dir: &Path, suffix: &Regex) -> Result<IngestSummary> {
    if !raw_dir.is_dir() {
        bail!("找不到原始图片目录: {}", raw_dir.display());
    }

    info!("开始扫描目录: {}", raw_dir.display());
    let images = utils::scan_images(raw_dir, suffix);
    info!("扫描完成，共 {} 张图片", images.len());

    let total = images.len() as u64;
    let subjects = group_by_subject(images);
    if subjects.is_empty() {
        bail!("{} 中没有符合条件的图片", raw_dir.display());
    }

    utils::reset_dir(out_dir)?;

    let pb = ProgressBar::new(total).with_style(pb_style());
    let mut summary = IngestSummary::default();

    for (idx, (subject, images)) in subjects.into_iter().enumerate() {
        let subject_id = format!("subject{:03}", idx + 1);
        let subject_dir = out_dir.join(&subject_id);
        fs::create_dir_all(&subject_dir)?;

        let mut count = 0;
        for path in images.into_iter().progress_with(pb.clone()) {
            let img = match utils::imread_gray(&path) {
                Ok(img) => img,
                Err(e) => {
                    warn!("{}，跳过", e);
                    summary.skipped.push(path);
                    continue;
                }
            };
            count += 1;
            let out_path = subject_dir.join(format!("img_{:03}.png", count));
            utils::imwrite(&out_path, &img)?;
            summary.samples.push(Sample {
                subject_id: subject_id.clone(),
                sequence_index: count,
                file_path: out_path,
            });
        }

        pb.println(format!("{} ({}): {} 张图片", subject_id, subject, count));
    }

    pb.finish_and_clear();
    info!("数据集整理完成，共 {} 张图片，跳过 {} 张", summary.samples.len(), summary.skipped.len());

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_of() {
        assert_eq!(subject_of(Path::new("raw/101_1.tif")).as_deref(), Some("101"));
        assert_eq!(subject_of(Path::new("raw/102.png")).as_deref(), Some("102"));
        assert_eq!(subject_of(Path::new("raw/_1.png")), None);
    }

    #[test]
    fn test_group_by_subject_sorted() {
        let paths = vec![
            PathBuf::from("b/102_2.tif"),
            PathBuf::from("a/101_2.tif"),
            PathBuf::from("a/101_1.tif"),
            PathBuf::from("b/102_1.tif"),
        ];
        let groups = group_by_subject(paths);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, ["101", "102"]);
        assert_eq!(groups["101"], [PathBuf::from("a/101_1.tif"), PathBuf::from("a/101_2.tif")]);
    }

    #[test]
    fn test_missing_raw_dir_is_fatal() {
        let re = utils::suffix_regex("tif").unwrap();
        let out = tempfile::TempDir::new().unwrap();
        assert!(ingest(Path::new("/nonexistent/raw"), out.path(), &re).is_err());
    }
}
