//! 去掉分类层的 ResNet-18
//!
//! 参数命名与 torchvision 的 `resnet18` 一致，可以直接加载由其 `state_dict`
//! 导出的 safetensors 文件。只用于推理，BatchNorm 始终使用保存的统计量。

use candle_core::{D, Module, ModuleT, Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, VarBuilder, batch_norm, conv2d_no_bias};

/// 倒数第二层（全局平均池化后）的维度
pub const FEATURE_DIM: usize = 512;

const BN_EPS: f64 = 1e-5;

fn conv(c_in: usize, c_out: usize, k: usize, stride: usize, padding: usize, vb: VarBuilder) -> Result<Conv2d> {
    let cfg = Conv2dConfig { stride, padding, ..Default::default() };
    conv2d_no_bias(c_in, c_out, k, cfg, vb)
}

struct ConvBn {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBn {
    fn new(conv: Conv2d, c_out: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self { conv, bn: batch_norm(c_out, BN_EPS, vb)? })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.bn.forward_t(&self.conv.forward(xs)?, false)
    }
}

struct BasicBlock {
    first: ConvBn,
    second: ConvBn,
    downsample: Option<ConvBn>,
}

impl BasicBlock {
    fn new(c_in: usize, c_out: usize, stride: usize, vb: VarBuilder) -> Result<Self> {
        let first = ConvBn::new(conv(c_in, c_out, 3, stride, 1, vb.pp("conv1"))?, c_out, vb.pp("bn1"))?;
        let second = ConvBn::new(conv(c_out, c_out, 3, 1, 1, vb.pp("conv2"))?, c_out, vb.pp("bn2"))?;
        let downsample = if stride != 1 || c_in != c_out {
            let vb = vb.pp("downsample");
            Some(ConvBn::new(conv(c_in, c_out, 1, stride, 0, vb.pp("0"))?, c_out, vb.pp("1"))?)
        } else {
            None
        };
        Ok(Self { first, second, downsample })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = self.first.forward(xs)?.relu()?;
        let ys = self.second.forward(&ys)?;
        let shortcut = match &self.downsample {
            Some(downsample) => downsample.forward(xs)?,
            None => xs.clone(),
        };
        (ys + shortcut)?.relu()
    }
}

pub struct ResNet18 {
    stem: ConvBn,
    layers: Vec<BasicBlock>,
}

impl ResNet18 {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        let stem = ConvBn::new(conv(3, 64, 7, 2, 3, vb.pp("conv1"))?, 64, vb.pp("bn1"))?;
        let mut layers = Vec::with_capacity(8);
        let mut c_in = 64;
        for (i, c_out) in [64, 128, 256, 512].into_iter().enumerate() {
            let vb = vb.pp(format!("layer{}", i + 1));
            let stride = if i == 0 { 1 } else { 2 };
            layers.push(BasicBlock::new(c_in, c_out, stride, vb.pp("0"))?);
            layers.push(BasicBlock::new(c_out, c_out, 1, vb.pp("1"))?);
            c_in = c_out;
        }
        Ok(Self { stem, layers })
    }
}

impl Module for ResNet18 {
    /// 输入 `(batch, 3, H, W)`，输出 `(batch, 512)`
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.stem.forward(xs)?.relu()?;
        // 边缘复制填充后做最大池化，等价于 padding=1 的 3x3 池化
        let mut xs = xs
            .pad_with_same(D::Minus1, 1, 1)?
            .pad_with_same(D::Minus2, 1, 1)?
            .max_pool2d_with_stride(3, 2)?;
        for block in &self.layers {
            xs = block.forward(&xs)?;
        }
        xs.mean(D::Minus1)?.mean(D::Minus1)
    }
}
