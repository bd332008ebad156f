#![allow(dead_code)]

use tempfile::TempDir;
use treat::sequence::{Fragment, Orientation, Sequence};
use treat::storage::{LoadConfig, Storage};
use treat::template::Template;

pub const GENE: &str = "ND7";

/// Backbone `ACGACGAC` with FE one edit base per site and PE none.
pub fn step_template() -> Template {
    let backbone = b"ACGACGAC".to_vec();
    let full = Sequence::from_parts(b'T', backbone.clone(), vec![1; 9]).expect("valid FE");
    let pre = Sequence::from_parts(b'T', backbone, vec![0; 9]).expect("valid PE");
    Template::new(full, pre, vec![], vec![]).expect("valid template")
}

pub fn fragment_with_sites(name: &str, sites: &[u32]) -> Fragment {
    let seq = Sequence::from_parts(b'T', b"ACGACGAC".to_vec(), sites.to_vec()).expect("nine sites");
    Fragment::from_sequence(name, 1, 1.0, seq)
}

/// Raw reads rendered from the step template: `n` fragments that switch from
/// PE to FE at a site cycling through the backbone.
pub fn step_reads(config: &LoadConfig, n: usize) -> Vec<Fragment> {
    (0..n)
        .map(|i| {
            let switch = i % 9;
            let sites: Vec<u32> = (0..9).map(|s| u32::from(s >= switch)).collect();
            let raw = Sequence::from_parts(b'T', b"ACGACGAC".to_vec(), sites)
                .expect("nine sites")
                .render();
            config.fragment(format!("read_{i}_{}", i % 4 + 1), raw.as_bytes())
        })
        .collect()
}

/// A read with an extra backbone base, classified as mutant.
pub fn mutant_read(config: &LoadConfig, name: &str) -> Fragment {
    config.fragment(name, b"TACGGACGACT")
}

pub fn temp_store() -> (TempDir, Storage) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = Storage::open(dir.path().join("treat.db")).expect("open store");
    (dir, store)
}

pub fn store_with_gene() -> (TempDir, Storage) {
    let (dir, mut store) = temp_store();
    store.put_template(GENE, &step_template()).expect("store template");
    (dir, store)
}

pub fn forward(raw: &str) -> Sequence {
    Sequence::decompose(raw.as_bytes(), b'T', Orientation::Forward)
}
