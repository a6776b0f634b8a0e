//! Checkpoint chain: accepted model snapshots with rollback.
//!
//! The chain is an arena-backed vector of records, oldest (the initial
//! model) first. Every epoch is appended as soon as its snapshot is written;
//! if the scheduler then judges the epoch a regression, the tail is popped
//! (its snapshot must not be reused) and the new tail is reloaded. The chain
//! never becomes empty: the head stays so a first-epoch regression can still
//! roll back to the initial model.
//!
//! A snapshot is two JSON files: the weight values, and the auxiliary
//! per-parameter state (momentum buffers, squared-gradient sums) needed for
//! exact resumption.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::TrainerContext;
use crate::error::{Error, Result};
use crate::optim::params::LayerParameters;
use crate::tensor::Tensor;

/// One accepted snapshot in the chain.
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    /// Weight snapshot file.
    pub path: PathBuf,
    /// Auxiliary per-parameter state files accompanying the snapshot.
    pub aux_paths: Vec<PathBuf>,
    /// Criterion the epoch scored.
    pub criterion: f32,
    /// Global epoch index.
    pub epoch: usize,
    /// Update counter at snapshot time.
    pub update_count: u64,
}

#[derive(Serialize, Deserialize)]
struct TensorState {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl TensorState {
    fn of(t: &Tensor) -> Self {
        Self { rows: t.rows(), cols: t.cols(), data: t.host().to_vec() }
    }

    fn restore(&self, t: &mut Tensor) {
        t.resize(self.rows, self.cols);
        t.host_mut().copy_from_slice(&self.data);
    }
}

#[derive(Serialize, Deserialize)]
struct LayerWeights {
    weight: TensorState,
    bias: TensorState,
    depth: usize,
    update_weight: bool,
    update_bias: bool,
}

#[derive(Serialize, Deserialize)]
struct WeightsSnapshot {
    layers: Vec<LayerWeights>,
}

#[derive(Serialize, Deserialize)]
struct LayerAux {
    weight_update: TensorState,
    weight_grad_sq_sum: TensorState,
    bias_update: TensorState,
    bias_grad_sq_sum: TensorState,
}

#[derive(Serialize, Deserialize)]
struct AuxSnapshot {
    layers: Vec<LayerAux>,
}

/// Owner of the checkpoint chain and its on-disk snapshots.
#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
    chain: Vec<CheckpointRecord>,
}

impl CheckpointManager {
    /// Manage snapshots under `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, chain: Vec::new() })
    }

    /// Number of records in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// True before the initial snapshot has been appended.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&CheckpointRecord> {
        self.chain.last()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[CheckpointRecord] {
        &self.chain
    }

    /// Save a snapshot of `layers` and append its record to the chain.
    pub fn append(
        &mut self,
        layers: &[LayerParameters],
        criterion: f32,
        epoch: usize,
        ctx: &TrainerContext,
    ) -> Result<&CheckpointRecord> {
        let path = self.dir.join(format!("epoch{epoch:03}.weights.json"));
        let aux_path = self.dir.join(format!("epoch{epoch:03}.aux.json"));

        let weights = WeightsSnapshot {
            layers: layers
                .iter()
                .map(|l| LayerWeights {
                    weight: TensorState::of(&l.weight.value),
                    bias: TensorState::of(&l.bias.value),
                    depth: l.depth,
                    update_weight: l.update_weight,
                    update_bias: l.update_bias,
                })
                .collect(),
        };
        let aux = AuxSnapshot {
            layers: layers
                .iter()
                .map(|l| LayerAux {
                    weight_update: TensorState::of(&l.weight.update),
                    weight_grad_sq_sum: TensorState::of(&l.weight.grad_sq_sum),
                    bias_update: TensorState::of(&l.bias.update),
                    bias_grad_sq_sum: TensorState::of(&l.bias.grad_sq_sum),
                })
                .collect(),
        };

        let data = serde_json::to_string(&weights)
            .map_err(|e| Error::Serialization(format!("weights snapshot failed: {e}")))?;
        fs::write(&path, data)?;
        let data = serde_json::to_string(&aux)
            .map_err(|e| Error::Serialization(format!("aux snapshot failed: {e}")))?;
        fs::write(&aux_path, data)?;

        self.chain.push(CheckpointRecord {
            path,
            aux_paths: vec![aux_path],
            criterion,
            epoch,
            update_count: ctx.update_count,
        });
        Ok(self.chain.last().unwrap())
    }

    /// Detach and discard the tail record and its snapshot files.
    ///
    /// Refuses to empty the chain: the head (initial model) must survive so
    /// a rollback always has a target.
    pub fn pop_last(&mut self) -> Result<CheckpointRecord> {
        if self.chain.len() <= 1 {
            return Err(Error::EmptyCheckpointChain);
        }
        let record = self.chain.pop().unwrap();
        // The regressed snapshot must not be reused; removal failures are
        // not fatal since the record is already detached.
        let _ = fs::remove_file(&record.path);
        for aux in &record.aux_paths {
            let _ = fs::remove_file(aux);
        }
        Ok(record)
    }

    /// Restore the live parameters from the tail snapshot.
    ///
    /// Weight values, momentum buffers and squared-gradient sums come back
    /// bit-for-bit; pending gradients and adaptive rates are cleared, and
    /// the context's update counter resets to the snapshot's.
    pub fn reload_last(
        &self,
        layers: &mut [LayerParameters],
        ctx: &mut TrainerContext,
    ) -> Result<()> {
        let record = self.chain.last().ok_or(Error::EmptyCheckpointChain)?;
        self.reload(record, layers, ctx)
    }

    fn reload(
        &self,
        record: &CheckpointRecord,
        layers: &mut [LayerParameters],
        ctx: &mut TrainerContext,
    ) -> Result<()> {
        let text = fs::read_to_string(&record.path)?;
        let weights: WeightsSnapshot = serde_json::from_str(&text)
            .map_err(|e| Error::Serialization(format!("weights snapshot corrupt: {e}")))?;
        if weights.layers.len() != layers.len() {
            return Err(Error::Serialization(format!(
                "snapshot has {} layers, model has {}",
                weights.layers.len(),
                layers.len()
            )));
        }
        for (layer, saved) in layers.iter_mut().zip(&weights.layers) {
            saved.weight.restore(&mut layer.weight.value);
            saved.bias.restore(&mut layer.bias.value);
            layer.depth = saved.depth;
            layer.update_weight = saved.update_weight;
            layer.update_bias = saved.update_bias;
        }

        for aux_path in &record.aux_paths {
            let text = fs::read_to_string(aux_path)?;
            let aux: AuxSnapshot = serde_json::from_str(&text)
                .map_err(|e| Error::Serialization(format!("aux snapshot corrupt: {e}")))?;
            for (layer, saved) in layers.iter_mut().zip(&aux.layers) {
                saved.weight_update.restore(&mut layer.weight.update);
                saved.weight_grad_sq_sum.restore(&mut layer.weight.grad_sq_sum);
                saved.bias_update.restore(&mut layer.bias.update);
                saved.bias_grad_sq_sum.restore(&mut layer.bias.grad_sq_sum);
            }
        }

        for layer in layers.iter_mut() {
            layer.weight.grad.host_mut().fill(0.0);
            layer.bias.grad.host_mut().fill(0.0);
            layer.weight.adaptive_rate.host_mut().fill(0.0);
            layer.bias.adaptive_rate.host_mut().fill(0.0);
        }
        ctx.update_count = record.update_count;
        Ok(())
    }

    /// Directory the snapshots live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn toy_layers() -> Vec<LayerParameters> {
        let mut layer = LayerParameters::new(2, 3, 1);
        layer.weight.value = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        layer.bias.value = Tensor::from_vec(vec![0.1, 0.2], 1, 2);
        layer.weight.update = Tensor::from_vec(vec![0.5; 6], 2, 3);
        layer.weight.grad_sq_sum = Tensor::from_vec(vec![2.0; 6], 2, 3);
        vec![layer]
    }

    #[test]
    fn test_append_writes_snapshot_files() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
        let layers = toy_layers();
        let ctx = TrainerContext::new();

        let record = manager.append(&layers, 0.5, 0, &ctx).expect("append");
        assert!(record.path.exists());
        assert!(record.aux_paths[0].exists());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_pop_refuses_to_empty_chain() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
        let layers = toy_layers();
        let ctx = TrainerContext::new();
        manager.append(&layers, 0.5, 0, &ctx).expect("append");

        match manager.pop_last() {
            Err(Error::EmptyCheckpointChain) => {}
            other => panic!("expected EmptyCheckpointChain, got {other:?}"),
        }
    }

    #[test]
    fn test_pop_removes_snapshot_files() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
        let layers = toy_layers();
        let ctx = TrainerContext::new();
        manager.append(&layers, 0.5, 0, &ctx).expect("append");
        manager.append(&layers, 0.6, 1, &ctx).expect("append");

        let popped = manager.pop_last().expect("pop");
        assert_eq!(popped.epoch, 1);
        assert!(!popped.path.exists());
        assert_eq!(manager.last().unwrap().epoch, 0);
    }

    #[test]
    fn test_reload_restores_bit_for_bit() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
        let mut layers = toy_layers();
        let mut ctx = TrainerContext::new();
        ctx.update_count = 42;
        manager.append(&layers, 0.5, 0, &ctx).expect("append");

        // Mutate everything the snapshot covers.
        layers[0].weight.value.host_mut().fill(-1.0);
        layers[0].bias.value.host_mut().fill(-1.0);
        layers[0].weight.update.host_mut().fill(-1.0);
        layers[0].weight.grad_sq_sum.host_mut().fill(-1.0);
        ctx.update_count = 99;

        manager.reload_last(&mut layers, &mut ctx).expect("reload");
        assert_eq!(layers[0].weight.value.host(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(layers[0].bias.value.host(), &[0.1, 0.2]);
        assert_eq!(layers[0].weight.update.host(), &[0.5; 6]);
        assert_eq!(layers[0].weight.grad_sq_sum.host(), &[2.0; 6]);
        assert_eq!(ctx.update_count, 42);
    }

    #[test]
    fn test_reload_clears_pending_gradients() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
        let mut layers = toy_layers();
        let mut ctx = TrainerContext::new();
        manager.append(&layers, 0.5, 0, &ctx).expect("append");

        layers[0].weight.grad.host_mut().fill(3.0);
        manager.reload_last(&mut layers, &mut ctx).expect("reload");
        assert!(layers[0].weight.grad.host().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_layer_count_mismatch_is_an_error() {
        let dir = tempdir().expect("create temp dir");
        let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
        let layers = toy_layers();
        let mut ctx = TrainerContext::new();
        manager.append(&layers, 0.5, 0, &ctx).expect("append");

        let mut wrong = vec![LayerParameters::new(1, 1, 0), LayerParameters::new(1, 1, 0)];
        match manager.reload_last(&mut wrong, &mut ctx) {
            Err(Error::Serialization(msg)) => assert!(msg.contains("layers")),
            other => panic!("expected Serialization error, got {other:?}"),
        }
    }
}
