//! Exercises the single-flight tree build from the `Scorer` side: many
//! threads score the same anchor/candidate pair concurrently, which must
//! all observe a tree build for that anchor coalesced into one.

use std::io::Write;

use wurdo_core::config::{Config, StorageMode};
use wurdo_core::model::DeterministicModelAdapter;
use wurdo_core::Engine;

fn fixture_engine(dir: &std::path::Path) -> Engine {
    let game_data = dir.join("game_data");
    std::fs::create_dir_all(&game_data).unwrap();
    std::fs::write(game_data.join("words.txt"), "cat\nhat\nbat\nrat\n").unwrap();
    std::fs::write(
        game_data.join("frequencies.json"),
        r#"{"cat":0.9,"hat":0.5,"bat":0.3,"rat":0.2}"#,
    )
    .unwrap();
    std::fs::write(game_data.join("anagrams.json"), "{}").unwrap();

    let cmudict_path = dir.join("cmudict.txt");
    let mut f = std::fs::File::create(&cmudict_path).unwrap();
    writeln!(f, "CAT  K AE1 T").unwrap();
    writeln!(f, "HAT  HH AE1 T").unwrap();
    writeln!(f, "BAT  B AE1 T").unwrap();
    writeln!(f, "RAT  R AE1 T").unwrap();

    let mut config = Config::default();
    config.game_data_dir = game_data;
    config.storage.mode = StorageMode::MemoryOnly;

    let model = Box::new(DeterministicModelAdapter::new(256));
    Engine::initialize(config, &cmudict_path, model).unwrap()
}

#[test]
fn concurrent_scores_of_the_same_pair_agree() {
    let dir = tempfile::tempdir().unwrap();
    let engine = fixture_engine(dir.path());
    let scorer = engine.scorer().unwrap();

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| scorer.score("cat", "hat").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let first_total = results[0].total_score;
    for r in &results[1..] {
        assert_eq!(r.total_score, first_total);
        assert_eq!(r.anchor, "cat");
        assert_eq!(r.candidate, "hat");
    }
}
