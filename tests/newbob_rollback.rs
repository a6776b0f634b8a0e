//! NewBob rollback against the checkpoint chain.
//!
//! Drives the epoch boundary protocol directly with a synthetic criterion
//! sequence: regress exactly once, then recover. The schedule must request
//! exactly one rollback and the reloaded parameters must match the last
//! accepted snapshot bit for bit.

use escuchar::checkpoint::CheckpointManager;
use escuchar::context::TrainerContext;
use escuchar::optim::{NewBobCriterion, Schedule};
use escuchar::tensor::Tensor;
use escuchar::LayerParameters;
use tempfile::tempdir;

fn layers_with_seed(seed: f32) -> Vec<LayerParameters> {
    let mut layer = LayerParameters::new(2, 3, 0);
    for (i, w) in layer.weight.value.host_mut().iter_mut().enumerate() {
        *w = seed + i as f32 * 0.125;
    }
    for (i, b) in layer.bias.value.host_mut().iter_mut().enumerate() {
        *b = seed * 0.5 - i as f32;
    }
    layer.weight.update = Tensor::from_vec(vec![seed; 6], 2, 3);
    layer.weight.grad_sq_sum = Tensor::from_vec(vec![seed.abs(); 6], 2, 3);
    vec![layer]
}

fn bits_of(layers: &[LayerParameters]) -> Vec<u32> {
    let l = &layers[0];
    l.weight
        .value
        .host()
        .iter()
        .chain(l.bias.value.host())
        .chain(l.weight.update.host())
        .chain(l.weight.grad_sq_sum.host())
        .map(|x| x.to_bits())
        .collect()
}

#[test]
fn regression_rolls_back_exactly_once_bit_for_bit() {
    let dir = tempdir().expect("create temp dir");
    let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
    let mut schedule = Schedule::newbob(0.5, NewBobCriterion::Acc, 0.004, 0.002)
        .with_epoch_bounds(0, 10);
    let mut ctx = TrainerContext::new();

    // Criterion regresses exactly once (epoch 2) then recovers.
    let criteria = [0.50f32, 0.60, 0.55, 0.65, 0.70];

    let mut layers = layers_with_seed(0.1);
    manager.append(&layers, f32::NEG_INFINITY, 0, &ctx).expect("initial snapshot");

    let mut rollbacks = 0;
    let mut accepted_bits = bits_of(&layers);
    for (epoch, &criterion) in criteria.iter().enumerate() {
        // Simulate an epoch of training mutating everything.
        layers = layers_with_seed(criterion);
        ctx.update_count += 100;

        manager.append(&layers, criterion, epoch + 1, &ctx).expect("append epoch");
        let decision = schedule.end_epoch(epoch, criterion);
        if decision.rollback {
            rollbacks += 1;
            manager.pop_last().expect("pop regressed snapshot");
            manager.reload_last(&mut layers, &mut ctx).expect("reload last accepted");
            assert_eq!(
                bits_of(&layers),
                accepted_bits,
                "reloaded parameters differ from the last accepted snapshot"
            );
        } else {
            accepted_bits = bits_of(&layers);
        }
        assert!(decision.continue_training, "sequence should not terminate early");
    }

    assert_eq!(rollbacks, 1, "exactly one regression, exactly one rollback");
    // Chain: initial + 5 epochs - 1 popped regression.
    assert_eq!(manager.len(), 5);
}

#[test]
fn rollback_resets_update_counter_to_snapshot() {
    let dir = tempdir().expect("create temp dir");
    let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
    let mut ctx = TrainerContext::new();
    let mut layers = layers_with_seed(1.0);

    ctx.update_count = 10;
    manager.append(&layers, 0.5, 0, &ctx).expect("append accepted");

    ctx.update_count = 25;
    manager.append(&layers, 0.4, 1, &ctx).expect("append regressed");

    manager.pop_last().expect("pop");
    manager.reload_last(&mut layers, &mut ctx).expect("reload");
    assert_eq!(ctx.update_count, 10);
}

#[test]
fn first_epoch_regression_falls_back_to_initial_model() {
    let dir = tempdir().expect("create temp dir");
    let mut manager = CheckpointManager::new(dir.path()).expect("create manager");
    let mut schedule = Schedule::newbob(0.5, NewBobCriterion::Acc, 0.004, 0.002)
        .with_epoch_bounds(0, 10);
    let mut ctx = TrainerContext::new();

    let initial = layers_with_seed(0.7);
    let initial_bits = bits_of(&initial);
    manager.append(&initial, f32::NEG_INFINITY, 0, &ctx).expect("initial snapshot");

    // Epoch 0 sets the baseline; epoch 1 regresses.
    let mut layers = layers_with_seed(0.3);
    manager.append(&layers, 0.6, 1, &ctx).expect("append epoch 0");
    assert!(!schedule.end_epoch(0, 0.6).rollback);

    layers = layers_with_seed(0.9);
    manager.append(&layers, 0.2, 2, &ctx).expect("append epoch 1");
    let decision = schedule.end_epoch(1, 0.2);
    assert!(decision.rollback);

    manager.pop_last().expect("pop epoch 1");
    manager.pop_last().expect("pop epoch 0");
    manager.reload_last(&mut layers, &mut ctx).expect("reload initial");
    assert_eq!(bits_of(&layers), initial_bits);
}
