//! Generates the baby-step table used to decrypt small integers

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, traits::Identity,
};
use std::{
    env,
    fs::File,
    io::{self, BufWriter},
    iter,
    path::Path,
};

const BABY_STEPS: usize = 2048;

fn main() -> io::Result<()> {
    const G: &RistrettoPoint = &RISTRETTO_BASEPOINT_POINT;
    let id = RistrettoPoint::identity();

    let points = iter::successors(Some(id), |p| Some(p + G)).take(BABY_STEPS);

    let mut map = phf_codegen::Map::new();
    for (i, p) in points.enumerate() {
        map.entry(p.compress().0, &i.to_string());
    }

    let out_dir = env::var("OUT_DIR").map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let path = Path::new(&out_dir).join("baby_steps.rs");
    let mut file = BufWriter::new(File::create(&path)?);
    map.build(&mut file)?;
    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
