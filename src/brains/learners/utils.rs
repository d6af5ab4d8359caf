use candle_core::{backprop::GradStore, Result, Tensor, Var, D};
use candle_nn::{AdamW, Linear, Optimizer, ParamsAdamW, VarBuilder, VarMap};

// keeps -log(-log(u)) finite at both ends of the uniform draw
const GUMBEL_EPS: f64 = 1e-10;

pub fn adam(vars: Vec<Var>, lr: f64) -> Result<AdamW> {
    AdamW::new(
        vars,
        ParamsAdamW {
            lr,
            weight_decay: 0.0,
            ..Default::default()
        },
    )
}

pub fn linear(in_len: usize, out_len: usize, gain: f64, vs: VarBuilder) -> Result<Linear> {
    let w_init = candle_nn::init::Init::Kaiming {
        dist: candle_nn::init::NormalOrUniform::Normal,
        fan: candle_nn::init::FanInOut::FanIn,
        non_linearity: candle_nn::init::NonLinearity::ExplicitGain(gain),
    };
    let b_init = candle_nn::init::Init::Const(0.0);
    let weight = vs.get_with_hints((out_len, in_len), "weight", w_init)?;
    let bias = vs.get_with_hints((out_len,), "bias", b_init)?;
    Ok(Linear::new(weight, Some(bias)))
}

/// Rescales the gradients of `vars` in place so their global L2 norm is at
/// most `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm(vars: &[Var], grads: &mut GradStore, max_norm: f64) -> Result<f64> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(g) = grads.get(var.as_tensor()) {
            total += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = total.sqrt();
    let coef = max_norm / (norm + 1e-6);
    if coef < 1.0 {
        for var in vars {
            if let Some(g) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), g.affine(coef, 0.0)?);
            }
        }
    }
    Ok(norm)
}

/// Backpropagates `loss` and clips the gradients that belong to `varmap`.
pub fn backward_clipped(loss: &Tensor, varmap: &VarMap, max_norm: f64) -> Result<GradStore> {
    let mut grads = loss.backward()?;
    clip_grad_norm(&varmap.all_vars(), &mut grads, max_norm)?;
    Ok(grads)
}

/// Gumbel-softmax over the last dimension at temperature 1.
///
/// With `hard` the forward value is the one-hot of the sampled class while the
/// gradient is that of the soft sample (straight-through estimator).
pub fn gumbel_softmax(logits: &Tensor, hard: bool) -> Result<Tensor> {
    let u = logits.rand_like(GUMBEL_EPS, 1.0 - 1e-7)?;
    let gumbel = u.log()?.neg()?.log()?.neg()?;
    let soft = candle_nn::ops::softmax(&(logits + gumbel)?, D::Minus1)?;
    if !hard {
        return Ok(soft);
    }
    let max = soft.max_keepdim(D::Minus1)?;
    let one_hot = soft.broadcast_eq(&max)?.to_dtype(soft.dtype())?;
    (one_hot - soft.detach())? + soft
}

/// Index of the largest entry of a `(1, n)` or `(n,)` tensor.
pub fn argmax(x: &Tensor) -> Result<usize> {
    let flat = x.flatten_all()?;
    Ok(flat.argmax(D::Minus1)?.to_scalar::<u32>()? as usize)
}
