use pienet::simd::{self, Native};
use pienet::{ClippedReLU, Dense, FeatureTable, FeatureUpdate, Network};
use pretty_assertions::assert_eq;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

const INPUT: usize = 64;
const FEATURES: usize = 40;
const DELTA: usize = INPUT * FEATURES;
const ROW: usize = INPUT * 2;
const OUTPUT: usize = 2;

type Net = Network<Native, ClippedReLU<127>, i16, i32, INPUT, DELTA, ROW, OUTPUT>;

fn random_net(rng: &mut SmallRng) -> Net {
    let table = FeatureTable::from_fn(|_, _| rng.gen_range(-40..40));
    let dense = Dense::from_vec(
        (0..ROW * OUTPUT).map(|_| rng.gen_range(-64..64)).collect(),
        (0..OUTPUT).map(|_| rng.gen_range(-500..500)).collect(),
    )
    .unwrap();
    let bias = Box::new(std::array::from_fn(|_| rng.gen_range(0..64)));
    Network::new(simd::native(), ClippedReLU, table, bias, dense)
}

fn mirror(f: usize) -> usize {
    FEATURES - 1 - f
}

#[test]
fn random_walk_stays_in_sync_with_full_refresh() {
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    let mut net = random_net(&mut rng);
    let mut active: BTreeSet<usize> = (0..10).map(|_| rng.gen_range(0..FEATURES)).collect();
    let list = |s: &BTreeSet<usize>| -> (Vec<usize>, Vec<usize>) {
        (s.iter().copied().collect(), s.iter().map(|&f| mirror(f)).collect())
    };
    let (a, b) = list(&active);
    net.refresh(&a, &b).unwrap();

    for step in 0..200 {
        let mut update = FeatureUpdate::new();
        // a move: one feature leaves, another arrives; sometimes a capture too
        let from = active.iter().nth(rng.gen_range(0..active.len().max(1))).copied();
        if let Some(from) = from {
            let to = rng.gen_range(0..FEATURES);
            if !active.contains(&to) {
                active.remove(&from);
                active.insert(to);
                update = update.remove(from, mirror(from)).add(to, mirror(to));
            }
        }
        if step % 7 == 3 && active.len() > 2 {
            let gone = *active.iter().next().unwrap();
            active.remove(&gone);
            update = update.remove(gone, mirror(gone));
        }
        if step % 11 == 5 {
            let new = rng.gen_range(0..FEATURES);
            if active.insert(new) {
                update = update.add(new, mirror(new));
            }
        }

        net.apply(&update).unwrap();
        let (a, b) = list(&active);
        assert_eq!(net.evaluate(), net.evaluate_full(&a, &b).unwrap(), "step {step}");
    }
}

#[test]
fn apply_then_revert_restores_accumulator() {
    let mut rng = SmallRng::seed_from_u64(7);
    let mut net = random_net(&mut rng);
    net.refresh(&[1, 5, 9], &[mirror(1), mirror(5), mirror(9)]).unwrap();
    let before = net.accumulator().clone();
    let eval = net.evaluate();

    let update = FeatureUpdate::new().remove(5, mirror(5)).add(12, mirror(12)).add(30, mirror(30));
    net.apply(&update).unwrap();
    net.revert(&update).unwrap();
    assert_eq!(net.accumulator(), &before);
    assert_eq!(net.evaluate(), eval);
}

#[test]
fn out_of_range_feature_is_rejected() {
    let mut rng = SmallRng::seed_from_u64(3);
    let mut net = random_net(&mut rng);
    assert!(net.refresh(&[FEATURES], &[0]).is_err());
    let err = net.apply(&FeatureUpdate::new().add(0, FEATURES + 3)).unwrap_err();
    assert_eq!(err, pienet::Error::FeatureOutOfRange { feature: FEATURES + 3, features: FEATURES });
}
