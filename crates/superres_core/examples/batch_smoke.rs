use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use superres_core::{BatchMaker, BatchMakerConfig};
use tiff::encoder::{colortype, TiffEncoder};

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse::<T>().ok())
        .unwrap_or(default)
}

/// Layered three-phase volume with a little structure in every axis.
fn write_volume(dir: &Path, side: usize) -> PathBuf {
    let path = dir.join("smoke_volume.tif");
    let file = File::create(&path).expect("create smoke volume");
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).expect("tiff encoder");
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    for _ in 0..side {
        let page: Vec<u8> = (0..side * side)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 40) % 3) as u8
            })
            .collect();
        encoder
            .write_image::<colortype::Gray8>(side as u32, side as u32, &page)
            .expect("write page");
    }
    path
}

fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let side = parse_arg(&args, "--side", 48usize);
    let high_res_len = parse_arg(&args, "--high-res-len", 16usize);
    let scale_factor = parse_arg(&args, "--sf", 4usize);
    let batch_size = parse_arg(&args, "--batch-size", 8usize);
    let down_sample = parse_arg(&args, "--down-sample", false);

    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_volume(dir.path(), side);

    let config = BatchMakerConfig {
        high_res_len,
        scale_factor,
        down_sample,
        stack: false,
        seed: Some(0),
        ..BatchMakerConfig::new(path)
    };

    let t0 = Instant::now();
    let mut maker: BatchMaker<f32> = BatchMaker::new(config).expect("batch maker");
    let setup = t0.elapsed();

    let t1 = Instant::now();
    let fake = maker
        .random_batch_for_fake(batch_size, 0)
        .expect("fake batch");
    let real = maker
        .random_batch_for_real(batch_size, 2)
        .expect("real batch");
    let sampling = t1.elapsed();

    let occupancy: f64 = fake.data().iter().map(|&v| v as f64).sum::<f64>() / fake.data().len() as f64;

    println!(
        "batch smoke done phases={:?} store_shape={:?} fake={:?} real={:?} occupancy={:.4} setup_s={:.3} sampling_s={:.3}",
        maker.phases().ids(),
        maker.store().encoded().shape(),
        fake.shape(),
        real.shape(),
        occupancy,
        setup.as_secs_f64(),
        sampling.as_secs_f64()
    );
}
