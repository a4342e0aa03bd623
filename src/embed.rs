use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use indicatif::{ProgressBar, ProgressIterator};
use log::{debug, info, warn};
use ndarray::Array2;
use opencv::core::{self, Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::backbone::{FEATURE_DIM, ResNet18};
use crate::config::BackboneOptions;
use crate::schema::{self, MetaRecord};
use crate::utils::{self, pb_style};

/// ImageNet 红色通道的均值和标准差，灰度图复制到三个通道后统一使用
const NORM_MEAN: f32 = 0.485;
const NORM_STD: f32 = 0.229;

/// 将单张灰度图片转换为定长向量
pub trait FeatureExtractor {
    fn dim(&self) -> usize;
    fn extract(&self, img: &Mat) -> Result<Vec<f32>>;
}

pub struct ResNetExtractor {
    model: ResNet18,
    device: Device,
    input_size: i32,
}

impl ResNetExtractor {
    pub fn new(vb: VarBuilder, input_size: i32) -> Result<Self> {
        let device = vb.device().clone();
        Ok(Self { model: ResNet18::new(vb)?, device, input_size })
    }

    /// 从 safetensors 权重文件加载网络
    pub fn load(opts: &BackboneOptions) -> Result<Self> {
        if !opts.weights.is_file() {
            bail!(
                "找不到 ResNet-18 权重文件: {}，请使用 --weights 指定 torchvision 导出的 safetensors",
                opts.weights.display()
            );
        }
        let device = opts.device.resolve()?;
        info!("使用设备: {:?}", device);
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&opts.weights], DType::F32, &device)
                .with_context(|| format!("无法加载权重文件 {}", opts.weights.display()))?
        };
        Self::new(vb, opts.input_size)
    }

    /// 缩放、归一化，并复制为三通道的 `(1, 3, S, S)` 张量
    fn preprocess(&self, img: &Mat) -> Result<Tensor> {
        let size = self.input_size;
        let mut resized = Mat::default();
        imgproc::resize(img, &mut resized, Size::new(size, size), 0.0, 0.0, interpolation(img, size))?;
        let mut float = Mat::default();
        resized.convert_to(&mut float, core::CV_32F, 1.0 / 255.0, 0.0)?;

        let data = float.data_typed::<f32>()?.to_vec();
        let s = size as usize;
        let xs = Tensor::from_vec(data, (1, 1, s, s), &self.device)?;
        let xs = ((xs - NORM_MEAN as f64)? / NORM_STD as f64)?;
        Ok(xs.repeat((1, 3, 1, 1))?)
    }
}

/// 缩小时使用 INTER_AREA 抗锯齿，放大时使用双线性插值
fn interpolation(img: &Mat, size: i32) -> i32 {
    if img.rows() > size || img.cols() > size { imgproc::INTER_AREA } else { imgproc::INTER_LINEAR }
}

impl FeatureExtractor for ResNetExtractor {
    fn dim(&self) -> usize {
        FEATURE_DIM
    }

    fn extract(&self, img: &Mat) -> Result<Vec<f32>> {
        let xs = self.preprocess(img)?;
        let ys = self.model.forward(&xs)?;
        Ok(ys.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }
}

/// 嵌入矩阵与逐行对应的元数据
#[derive(Debug, Clone)]
pub struct EmbeddingSet {
    pub vectors: Array2<f32>,
    pub meta: Vec<MetaRecord>,
}

impl EmbeddingSet {
    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn save(&self, x_path: &Path, meta_path: &Path) -> Result<()> {
        for path in [x_path, meta_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        schema::write_matrix(x_path, &self.vectors)?;
        schema::write_csv(meta_path, &self.meta)?;
        Ok(())
    }

    pub fn load(x_path: &Path, meta_path: &Path) -> Result<Self> {
        let (vectors, meta) = schema::read_aligned(x_path, meta_path, None)?;
        Ok(Self { vectors, meta })
    }
}

/// 对 `input` 下每个受试者目录中的图片提取嵌入向量
///
/// 受试者和图片都按名称排序；无法读取的图片会被跳过。
/// 一个向量都没有提取到时返回错误。
pub fn extract_dir(input: &Path, extractor: &impl FeatureExtractor) -> Result<EmbeddingSet> {
    if !input.is_dir() {
        bail!("找不到图片目录: {}", input.display());
    }
    let re = utils::suffix_regex("png,jpg,jpeg,tif")?;

    let mut jobs = vec![];
    for subject_dir in utils::subject_dirs(input)? {
        let subject = subject_dir.file_name().context("受试者目录没有名称")?.to_string_lossy().into_owned();
        let images = utils::list_images(&subject_dir, &re)?;
        if images.is_empty() {
            warn!("{} 中没有图片，跳过", subject_dir.display());
            continue;
        }
        debug!("{}: {} 张图片", subject, images.len());
        jobs.extend(images.into_iter().map(|image| (subject.clone(), image)));
    }

    let dim = extractor.dim();
    let mut flat = Vec::with_capacity(jobs.len() * dim);
    let mut meta = Vec::with_capacity(jobs.len());

    let pb = ProgressBar::new(jobs.len() as u64).with_style(pb_style());
    for (subject, path) in jobs.into_iter().progress_with(pb.clone()) {
        let img = match utils::imread_gray(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!("{}，跳过", e);
                continue;
            }
        };
        let vector = extractor.extract(&img).with_context(|| format!("无法提取 {} 的特征", path.display()))?;
        if vector.len() != dim {
            bail!("{} 的特征维度为 {}，预期为 {}", path.display(), vector.len(), dim);
        }
        flat.extend(vector);
        let filename = path.file_name().context("图片没有文件名")?.to_string_lossy().into_owned();
        meta.push(MetaRecord { subject, filename });
    }
    pb.finish_and_clear();

    if meta.is_empty() {
        bail!("没有从 {} 提取到任何嵌入向量", input.display());
    }

    let vectors = Array2::from_shape_vec((meta.len(), dim), flat)?;
    info!("特征提取完成，共 {} 个 {} 维向量", meta.len(), dim);
    Ok(EmbeddingSet { vectors, meta })
}

#[cfg(test)]
mod tests {
    use candle_nn::VarMap;
    use tempfile::TempDir;

    use super::*;
    use crate::utils::gray_canvas;

    /// 以图片均值作为唯一特征
    struct MeanExtractor;

    impl FeatureExtractor for MeanExtractor {
        fn dim(&self) -> usize {
            1
        }

        fn extract(&self, img: &Mat) -> Result<Vec<f32>> {
            Ok(vec![core::mean_def(img)?[0] as f32])
        }
    }

    fn write_dataset(dir: &Path) {
        for (subject, values) in [("subject001", [10.0, 20.0]), ("subject002", [200.0, 210.0])] {
            let subject_dir = dir.join(subject);
            fs::create_dir_all(&subject_dir).unwrap();
            for (i, v) in values.into_iter().enumerate() {
                let path = subject_dir.join(format!("img_{:03}.png", i + 1));
                utils::imwrite(&path, &gray_canvas(32, 32, v).unwrap()).unwrap();
            }
        }
        fs::create_dir_all(dir.join("subject003")).unwrap();
        fs::write(dir.join("subject002/img_003.png"), b"broken").unwrap();
    }

    #[test]
    fn test_extract_dir_is_aligned() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path());
        let set = extract_dir(dir.path(), &MeanExtractor).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.vectors.dim(), (4, 1));
        assert_eq!(set.meta[2], MetaRecord { subject: "subject002".into(), filename: "img_001.png".into() });
        assert_eq!(set.vectors[[2, 0]], 200.0);
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("subject001")).unwrap();
        assert!(extract_dir(dir.path(), &MeanExtractor).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        write_dataset(&dir.path().join("images"));
        let set = extract_dir(&dir.path().join("images"), &MeanExtractor).unwrap();
        let (x, meta) = (dir.path().join("embeddings/X.npy"), dir.path().join("embeddings/meta.csv"));
        set.save(&x, &meta).unwrap();
        let loaded = EmbeddingSet::load(&x, &meta).unwrap();
        assert_eq!(loaded.vectors, set.vectors);
        assert_eq!(loaded.meta, set.meta);
    }

    #[test]
    fn test_resnet_extractor_dim() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let extractor = ResNetExtractor::new(vb, 64).unwrap();
        let img = gray_canvas(100, 80, 128.0).unwrap();
        let vector = extractor.extract(&img).unwrap();
        assert_eq!(vector.len(), FEATURE_DIM);
        assert_eq!(extractor.dim(), FEATURE_DIM);
    }

    #[test]
    fn test_downscale_uses_area_interpolation() {
        let large = gray_canvas(300, 300, 0.0).unwrap();
        let small = gray_canvas(100, 80, 0.0).unwrap();
        assert_eq!(interpolation(&large, 224), imgproc::INTER_AREA);
        assert_eq!(interpolation(&small, 224), imgproc::INTER_LINEAR);
    }

    #[test]
    fn test_downscale_keeps_thin_ridges() {
        // 隔行的黑白条纹缩小一半后应接近灰色，而不是全黑或全白
        let mut img = gray_canvas(64, 64, 0.0).unwrap();
        for r in (0..64).step_by(2) {
            for c in 0..64 {
                *img.at_2d_mut::<u8>(r, c).unwrap() = 255;
            }
        }
        let mut resized = Mat::default();
        imgproc::resize(&img, &mut resized, Size::new(32, 32), 0.0, 0.0, interpolation(&img, 32)).unwrap();
        let m = core::mean_def(&resized).unwrap()[0];
        assert!((m - 127.5).abs() < 2.0, "mean = {}", m);
        assert!(resized.data_bytes().unwrap().iter().all(|&v| (120..=135).contains(&v)));
    }

    #[test]
    fn test_missing_weights_is_fatal() {
        let opts = BackboneOptions { weights: "/nonexistent/resnet18.safetensors".into(), ..Default::default() };
        let err = ResNetExtractor::load(&opts).err().unwrap();
        assert!(err.to_string().contains("权重"));
    }
}
