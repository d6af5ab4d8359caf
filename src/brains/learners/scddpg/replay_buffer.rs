use candle_core::Tensor;

use crate::{brains::learners::DEVICE, Error, Result};

/// A batch of transitions gathered from one agent's buffer.
#[derive(Debug, Clone)]
pub struct Transitions {
    /// `(n, obs_len)`
    pub obs: Tensor,
    /// `(n, action_len)`, one-hot
    pub action: Tensor,
    /// `(n,)`
    pub reward: Tensor,
    /// `(n, obs_len)`
    pub next_obs: Tensor,
    /// `(n,)`, 1.0 where the episode ended
    pub done: Tensor,
}

/// Fixed-capacity ring of transitions for a single agent.
///
/// Fields are stored flat and only grow up to capacity, after which the
/// oldest slot is overwritten.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    capacity: usize,
    obs_len: usize,
    action_len: usize,
    obs: Vec<f32>,
    action: Vec<f32>,
    reward: Vec<f32>,
    next_obs: Vec<f32>,
    done: Vec<f32>,
    cursor: usize,
    len: usize,
}

fn write_slot(field: &mut Vec<f32>, slot: usize, values: &[f32]) {
    let start = slot * values.len();
    if start == field.len() {
        field.extend_from_slice(values);
    } else {
        field[start..start + values.len()].copy_from_slice(values);
    }
}

fn gather(field: &[f32], width: usize, indices: &[usize]) -> Vec<f32> {
    let mut out = Vec::with_capacity(indices.len() * width);
    for &i in indices {
        out.extend_from_slice(&field[i * width..(i + 1) * width]);
    }
    out
}

impl ReplayBuffer {
    pub fn new(capacity: usize, obs_len: usize, action_len: usize) -> Self {
        Self {
            capacity,
            obs_len,
            action_len,
            obs: Vec::new(),
            action: Vec::new(),
            reward: Vec::new(),
            next_obs: Vec::new(),
            done: Vec::new(),
            cursor: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn check_len(expected: usize, values: &[f32]) -> Result<()> {
        if values.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: values.len(),
            });
        }
        Ok(())
    }

    pub fn add(
        &mut self,
        obs: &[f32],
        action: &[f32],
        reward: f32,
        next_obs: &[f32],
        done: bool,
    ) -> Result<()> {
        Self::check_len(self.obs_len, obs)?;
        Self::check_len(self.action_len, action)?;
        Self::check_len(self.obs_len, next_obs)?;
        if self.capacity == 0 {
            return Ok(());
        }

        let slot = self.cursor;
        write_slot(&mut self.obs, slot, obs);
        write_slot(&mut self.action, slot, action);
        write_slot(&mut self.reward, slot, &[reward]);
        write_slot(&mut self.next_obs, slot, next_obs);
        write_slot(&mut self.done, slot, &[if done { 1.0 } else { 0.0 }]);

        self.cursor = (self.cursor + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
        Ok(())
    }

    /// Stacks the transitions at `indices`. Callers share one index set
    /// across agents so that rows line up by timestep.
    pub fn sample(&self, indices: &[usize]) -> Result<Transitions> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len) {
            return Err(Error::SampleIndex {
                index,
                len: self.len,
            });
        }
        let n = indices.len();
        Ok(Transitions {
            obs: Tensor::from_vec(gather(&self.obs, self.obs_len, indices), (n, self.obs_len), &DEVICE)?,
            action: Tensor::from_vec(
                gather(&self.action, self.action_len, indices),
                (n, self.action_len),
                &DEVICE,
            )?,
            reward: Tensor::from_vec(gather(&self.reward, 1, indices), n, &DEVICE)?,
            next_obs: Tensor::from_vec(
                gather(&self.next_obs, self.obs_len, indices),
                (n, self.obs_len),
                &DEVICE,
            )?,
            done: Tensor::from_vec(gather(&self.done, 1, indices), n, &DEVICE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(buf: &mut ReplayBuffer, marker: f32) {
        buf.add(&[marker, marker], &[1.0, 0.0, 0.0], marker, &[marker + 0.5, marker + 0.5], false)
            .unwrap();
    }

    #[test]
    fn size_tracks_inserts_until_capacity() {
        let mut buf = ReplayBuffer::new(4, 2, 3);
        assert!(buf.is_empty());
        for i in 0..3 {
            push(&mut buf, i as f32);
        }
        assert_eq!(buf.len(), 3);
        for i in 3..10 {
            push(&mut buf, i as f32);
        }
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.capacity(), 4);
    }

    #[test]
    fn oldest_entries_are_overwritten() {
        let mut buf = ReplayBuffer::new(4, 2, 3);
        for i in 0..6 {
            push(&mut buf, i as f32);
        }
        let batch = buf.sample(&[0, 1, 2, 3]).unwrap();
        let mut rewards = batch.reward.to_vec1::<f32>().unwrap();
        rewards.sort_by(f32::total_cmp);
        assert_eq!(rewards, vec![2.0, 3.0, 4.0, 5.0]);
        // slots 0 and 1 were rewritten by the fifth and sixth inserts
        assert_eq!(batch.obs.to_vec2::<f32>().unwrap()[0], vec![4.0, 4.0]);
        assert_eq!(batch.next_obs.to_vec2::<f32>().unwrap()[1], vec![5.5, 5.5]);
    }

    #[test]
    fn sample_shapes() {
        let mut buf = ReplayBuffer::new(10, 2, 3);
        for i in 0..5 {
            buf.add(&[0.0; 2], &[0.0, 0.0, 1.0], i as f32, &[0.0; 2], i == 4).unwrap();
        }
        let batch = buf.sample(&[4, 0]).unwrap();
        assert_eq!(batch.obs.dims(), &[2, 2]);
        assert_eq!(batch.action.dims(), &[2, 3]);
        assert_eq!(batch.reward.to_vec1::<f32>().unwrap(), vec![4.0, 0.0]);
        assert_eq!(batch.done.to_vec1::<f32>().unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn shared_indices_align_agents() {
        let mut a = ReplayBuffer::new(8, 2, 3);
        let mut b = ReplayBuffer::new(8, 2, 3);
        for t in 0..12 {
            push(&mut a, t as f32);
            push(&mut b, 100.0 + t as f32);
        }
        let indices = [5, 1, 7, 0];
        let ra = a.sample(&indices).unwrap().reward.to_vec1::<f32>().unwrap();
        let rb = b.sample(&indices).unwrap().reward.to_vec1::<f32>().unwrap();
        for (x, y) in ra.iter().zip(rb.iter()) {
            assert_eq!(*y - *x, 100.0);
        }
    }

    #[test]
    fn bad_input_is_rejected() {
        let mut buf = ReplayBuffer::new(4, 2, 3);
        assert!(matches!(
            buf.add(&[0.0; 3], &[0.0; 3], 0.0, &[0.0; 2], false),
            Err(Error::DimensionMismatch { expected: 2, got: 3 })
        ));
        push(&mut buf, 1.0);
        assert!(matches!(buf.sample(&[1]), Err(Error::SampleIndex { index: 1, len: 1 })));
    }
}
