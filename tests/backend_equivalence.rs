use pienet::kernels;
use pienet::simd::{Backend, Lanes, Scalar};
use pienet::verify;
use pretty_assertions::assert_eq;

fn pattern<const N: usize>(seed: i32) -> [i32; N] {
    std::array::from_fn(|i| (i as i32 * 7919 + seed).wrapping_mul(2_654_435_761u32 as i32) >> 8)
}

/// i32 accumulators with wrapping values, every update kernel.
fn check_i32_updates<B: Lanes<i32>>(backend: B) {
    let delta = pattern::<512>(3);
    let (mut va, mut vb) = (pattern::<64>(1), pattern::<64>(2));
    let (mut sa, mut sb) = (va, vb);

    kernels::add_to_all(backend, &mut va, &mut vb, &delta, 64, 448);
    kernels::add_to_all(Scalar, &mut sa, &mut sb, &delta, 64, 448);
    assert_eq!((va, vb), (sa, sb), "add_to_all on {}", B::NAME);

    kernels::subtract_and_add_to_all(backend, &mut va, &mut vb, &delta, 64, 128, 448, 0);
    kernels::subtract_and_add_to_all(Scalar, &mut sa, &mut sb, &delta, 64, 128, 448, 0);
    assert_eq!((va, vb), (sa, sb), "subtract_and_add_to_all on {}", B::NAME);

    kernels::subtract_from_all(backend, &mut va, &mut vb, &delta, 128, 0);
    kernels::subtract_from_all(Scalar, &mut sa, &mut sb, &delta, 128, 0);
    assert_eq!((va, vb), (sa, sb), "subtract_from_all on {}", B::NAME);
    assert_eq!((va, vb), (pattern::<64>(1), pattern::<64>(2)));
}

#[test]
fn scalar_verifies_against_reference() {
    let report = verify::verify(Scalar, 8, 11).unwrap();
    assert!(report.checks > 0);
    check_i32_updates(Scalar);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn avx2_matches_scalar() {
    let Some(b) = pienet::simd::Avx2::detect() else {
        eprintln!("skipping: no avx2");
        return;
    };
    check_i32_updates(b);
    let report = verify::verify(b, 32, 0xa0a2).unwrap();
    assert_eq!(report.backend, "avx2");
}

#[cfg(target_arch = "x86_64")]
#[test]
fn avx512_matches_scalar() {
    let Some(b) = pienet::simd::Avx512::detect() else {
        eprintln!("skipping: no avx512bw");
        return;
    };
    check_i32_updates(b);
    let report = verify::verify(b, 32, 0xa512).unwrap();
    assert_eq!(report.backend, "avx512");
}

#[test]
fn every_available_backend_verifies() {
    let reports = verify::verify_available(4, 99).unwrap();
    assert_eq!(reports.len(), pienet::simd::available().len());
    assert!(reports.iter().all(|r| r.rounds == 4 && r.checks > 0));
}
