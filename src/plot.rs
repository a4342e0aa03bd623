use std::path::Path;

use anyhow::{Result, bail};
use itertools::Itertools;
use ndarray::ArrayView2;
use opencv::core::{self, Mat, Point, Rect, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use crate::schema::MetaRecord;
use crate::utils;

/// matplotlib tab10 调色板，BGR 顺序
const TAB10: [(f64, f64, f64); 10] = [
    (180.0, 119.0, 31.0),
    (14.0, 127.0, 255.0),
    (44.0, 160.0, 44.0),
    (40.0, 39.0, 214.0),
    (189.0, 103.0, 148.0),
    (75.0, 86.0, 140.0),
    (194.0, 119.0, 227.0),
    (127.0, 127.0, 127.0),
    (34.0, 189.0, 188.0),
    (207.0, 190.0, 23.0),
];

const WIDTH: i32 = 1000;
const HEIGHT: i32 = 800;
const MARGIN_LEFT: i32 = 80;
const MARGIN_RIGHT: i32 = 200;
const MARGIN_TOP: i32 = 60;
const MARGIN_BOTTOM: i32 = 70;
/// 图例中最多列出的受试者数量
const LEGEND_LIMIT: usize = 30;

const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;

fn color(i: usize) -> Scalar {
    let (b, g, r) = TAB10[i % TAB10.len()];
    Scalar::new(b, g, r, 0.0)
}

fn black() -> Scalar {
    Scalar::all(0.0)
}

fn text(img: &mut Mat, s: &str, org: Point, scale: f64) -> Result<()> {
    imgproc::put_text(img, s, org, FONT, scale, black(), 1, imgproc::LINE_AA, false)?;
    Ok(())
}

/// 绘制按受试者着色的二维散点图
pub fn scatter(points: ArrayView2<f32>, meta: &[MetaRecord], title: &str) -> Result<Mat> {
    if points.ncols() != 2 {
        bail!("散点图只支持二维数据，实际为 {} 维", points.ncols());
    }
    if points.nrows() != meta.len() {
        bail!("点的数量 {} 与元数据行数 {} 不一致", points.nrows(), meta.len());
    }

    let mut img = Mat::new_rows_cols_with_default(HEIGHT, WIDTH, core::CV_8UC3, Scalar::all(255.0))?;

    let plot = Rect::new(
        MARGIN_LEFT,
        MARGIN_TOP,
        WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
        HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
    );
    imgproc::rectangle(&mut img, plot, black(), 1, imgproc::LINE_8, 0)?;

    let bounds = |col: usize| {
        let (min, max) = points.column(col).iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
        // 所有点重合时给出一个单位宽度的区间
        let pad = ((max - min) * 0.05).max(0.5);
        (min - pad, max + pad)
    };
    let (x_min, x_max) = bounds(0);
    let (y_min, y_max) = bounds(1);
    let to_pixel = |x: f32, y: f32| {
        let px = plot.x as f32 + (x - x_min) / (x_max - x_min) * plot.width as f32;
        let py = (plot.y + plot.height) as f32 - (y - y_min) / (y_max - y_min) * plot.height as f32;
        Point::new(px.round() as i32, py.round() as i32)
    };

    let subjects = meta.iter().map(|m| m.subject.as_str()).unique().sorted().collect::<Vec<_>>();
    for (row, record) in points.rows().into_iter().zip(meta) {
        let idx = subjects.binary_search(&record.subject.as_str()).unwrap_or(0);
        imgproc::circle(&mut img, to_pixel(row[0], row[1]), 5, color(idx), imgproc::FILLED, imgproc::LINE_AA, 0)?;
    }

    // 刻度
    for i in 0..=4 {
        let t = i as f32 / 4.0;
        let xv = x_min + (x_max - x_min) * t;
        let yv = y_min + (y_max - y_min) * t;
        let px = to_pixel(xv, y_min);
        let py = to_pixel(x_min, yv);
        text(&mut img, &format!("{:.1}", xv), Point::new(px.x - 15, plot.y + plot.height + 20), 0.45)?;
        text(&mut img, &format!("{:.1}", yv), Point::new(plot.x - 50, py.y + 5), 0.45)?;
    }

    text(&mut img, title, Point::new(MARGIN_LEFT, MARGIN_TOP - 20), 0.8)?;
    text(&mut img, "UMAP-1", Point::new(plot.x + plot.width / 2 - 30, HEIGHT - 20), 0.6)?;
    let mut label = Mat::default();
    {
        // 纵轴标签逆时针旋转 90 度
        let mut horizontal = Mat::new_rows_cols_with_default(24, 80, core::CV_8UC3, Scalar::all(255.0))?;
        text(&mut horizontal, "UMAP-2", Point::new(2, 18), 0.6)?;
        core::rotate(&horizontal, &mut label, core::ROTATE_90_COUNTERCLOCKWISE)?;
    }
    let top = plot.y + plot.height / 2 - label.rows() / 2;
    {
        let mut roi = Mat::roi_mut(&mut img, Rect::new(8, top, label.cols(), label.rows()))?;
        label.copy_to(&mut *roi)?;
    }

    let legend_x = plot.x + plot.width + 20;
    text(&mut img, "Subject", Point::new(legend_x, MARGIN_TOP), 0.55)?;
    for (i, subject) in subjects.iter().take(LEGEND_LIMIT).enumerate() {
        let y = MARGIN_TOP + 22 + i as i32 * 20;
        imgproc::circle(&mut img, Point::new(legend_x + 6, y - 5), 5, color(i), imgproc::FILLED, imgproc::LINE_AA, 0)?;
        text(&mut img, subject, Point::new(legend_x + 18, y), 0.45)?;
    }
    if subjects.len() > LEGEND_LIMIT {
        let y = MARGIN_TOP + 22 + LEGEND_LIMIT as i32 * 20;
        text(&mut img, &format!("... +{}", subjects.len() - LEGEND_LIMIT), Point::new(legend_x, y), 0.45)?;
    }

    Ok(img)
}

pub fn save_scatter(path: &Path, points: ArrayView2<f32>, meta: &[MetaRecord], title: &str) -> Result<()> {
    let img = scatter(points, meta, title)?;
    utils::imwrite(path, &img)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn meta(subjects: &[&str]) -> Vec<MetaRecord> {
        subjects.iter().map(|s| MetaRecord { subject: s.to_string(), filename: "img_001.png".into() }).collect()
    }

    #[test]
    fn test_scatter_size() {
        let points = array![[0.0f32, 0.0], [1.0, 2.0], [3.0, 1.0]];
        let img = scatter(points.view(), &meta(&["a", "b", "a"]), "UMAP").unwrap();
        assert_eq!((img.rows(), img.cols()), (HEIGHT, WIDTH));
        assert_eq!(img.typ(), core::CV_8UC3);
    }

    #[test]
    fn test_scatter_single_point() {
        let points = array![[5.0f32, 5.0]];
        assert!(scatter(points.view(), &meta(&["a"]), "UMAP").is_ok());
    }

    #[test]
    fn test_scatter_rejects_misaligned() {
        let points = array![[0.0f32, 0.0], [1.0, 1.0]];
        assert!(scatter(points.view(), &meta(&["a"]), "UMAP").is_err());
    }

    #[test]
    fn test_save_scatter() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("umap_plot.png");
        let points = array![[0.0f32, 0.0], [1.0, 1.0]];
        save_scatter(&path, points.view(), &meta(&["a", "b"]), "UMAP").unwrap();
        assert!(utils::imread_gray(&path).is_ok());
    }
}
