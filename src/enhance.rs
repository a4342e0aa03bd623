use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressIterator};
use log::{info, warn};
use opencv::core::{self, Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::EnhanceOptions;
use crate::utils::{self, pb_style};

/// 限制对比度的自适应直方图均衡
#[derive(Debug, Clone)]
pub struct Clahe {
    clip_limit: f64,
    tile_grid: Size,
}

impl Clahe {
    pub fn new(opts: &EnhanceOptions) -> Self {
        let (rows, cols) = opts.tile_grid;
        Self { clip_limit: opts.clip_limit, tile_grid: Size::new(cols, rows) }
    }

    pub fn apply(&self, img: &Mat) -> Result<Mat> {
        let mut clahe = imgproc::create_clahe(self.clip_limit, self.tile_grid)?;
        let mut output = Mat::default();
        clahe.apply(img, &mut output)?;
        Ok(output)
    }

    /// CLAHE 后缩放到 [0, 1] 再量化回 8 位
    pub fn enhance(&self, img: &Mat) -> Result<Mat> {
        let equalized = self.apply(img)?;
        to_u8(&normalize(&equalized)?)
    }
}

/// 将 8 位图片缩放为 [0, 1] 的浮点图片
pub fn normalize(img: &Mat) -> Result<Mat> {
    let mut output = Mat::default();
    img.convert_to(&mut output, core::CV_32F, 1.0 / 255.0, 0.0)?;
    Ok(output)
}

/// 将 [0, 1] 的浮点图片四舍五入量化为 8 位
pub fn to_u8(img: &Mat) -> Result<Mat> {
    let mut output = Mat::default();
    img.convert_to(&mut output, core::CV_8U, 255.0, 0.0)?;
    Ok(output)
}

/// 增强 `input` 下每个受试者目录中的图片，按相同结构写入 `output`
pub fn enhance_dir(input: &Path, output: &Path, clahe: &Clahe) -> Result<usize> {
    if !input.is_dir() {
        bail!("找不到待增强的图片目录: {}", input.display());
    }
    let re = utils::suffix_regex("png,jpg,jpeg,tif,tiff,bmp")?;

    let mut jobs = vec![];
    for subject_dir in utils::subject_dirs(input)? {
        let name = subject_dir.file_name().context("受试者目录没有名称")?;
        let out_dir = output.join(name);
        for image in utils::list_images(&subject_dir, &re)? {
            let out_path = out_dir.join(image.file_name().context("图片没有文件名")?).with_extension("png");
            jobs.push((image, out_path));
        }
    }

    utils::reset_dir(output)?;

    let pb = ProgressBar::new(jobs.len() as u64).with_style(pb_style());
    let mut count = 0;
    for (src, dst) in jobs.into_iter().progress_with(pb.clone()) {
        let img = match utils::imread_gray(&src) {
            Ok(img) => img,
            Err(e) => {
                warn!("{}，跳过", e);
                continue;
            }
        };
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        utils::imwrite(&dst, &clahe.enhance(&img)?)?;
        count += 1;
    }
    pb.finish_and_clear();

    info!("对比度增强完成，共 {} 张图片", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn gradient(rows: i32, cols: i32) -> Mat {
        let mut img = utils::gray_canvas(rows, cols, 0.0).unwrap();
        for r in 0..rows {
            for c in 0..cols {
                // 低对比度的斜向条纹，模拟指纹脊线
                *img.at_2d_mut::<u8>(r, c).unwrap() = (100 + (r + c) % 7 * 4 + c / 8) as u8;
            }
        }
        img
    }

    #[test]
    fn test_enhance_keeps_shape_and_type() {
        let clahe = Clahe::new(&EnhanceOptions::default());
        let img = gradient(64, 48);
        let out = clahe.enhance(&img).unwrap();
        assert_eq!(out.rows(), 64);
        assert_eq!(out.cols(), 48);
        assert_eq!(out.typ(), core::CV_8UC1);
    }

    #[test]
    fn test_enhance_stretches_contrast() {
        let clahe = Clahe::new(&EnhanceOptions::default());
        let img = gradient(256, 256);
        let out = clahe.enhance(&img).unwrap();
        let span = |m: &Mat| {
            let data = m.data_bytes().unwrap();
            data.iter().max().unwrap() - data.iter().min().unwrap()
        };
        assert!(span(&out) > span(&img));
    }

    #[test]
    fn test_quantize_roundtrip_is_lossless() {
        let img = gradient(16, 16);
        let out = to_u8(&normalize(&img).unwrap()).unwrap();
        assert_eq!(img.data_bytes().unwrap(), out.data_bytes().unwrap());
    }

    #[test]
    fn test_enhance_dir_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("processed");
        fs::create_dir_all(input.join("subject001")).unwrap();
        utils::imwrite(&input.join("subject001/img_001.png"), &gradient(64, 64)).unwrap();
        fs::write(input.join("subject001/img_002.png"), b"not an image").unwrap();

        let clahe = Clahe::new(&EnhanceOptions::default());
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        assert_eq!(enhance_dir(&input, &first, &clahe).unwrap(), 1);
        assert_eq!(enhance_dir(&input, &second, &clahe).unwrap(), 1);

        let a = fs::read(first.join("subject001/img_001.png")).unwrap();
        let b = fs::read(second.join("subject001/img_001.png")).unwrap();
        assert_eq!(a, b);
    }
}
