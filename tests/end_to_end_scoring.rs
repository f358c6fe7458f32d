//! End-to-end scenarios wiring `Engine` -> `Scorer` -> `GameCoordinator`
//! against a small fixture lexicon, exercising the scoring flow the way a
//! real caller would rather than any single module in isolation.

use std::io::Write;

use wurdo_core::config::{Config, StorageMode};
use wurdo_core::game::{GameCoordinator, Player};
use wurdo_core::model::DeterministicModelAdapter;
use wurdo_core::{Engine, Error};

fn fixture_engine(dir: &std::path::Path) -> Engine {
    let game_data = dir.join("game_data");
    std::fs::create_dir_all(&game_data).unwrap();
    std::fs::write(game_data.join("words.txt"), "cat\nhat\nbat\nact\ncart\n").unwrap();
    std::fs::write(
        game_data.join("frequencies.json"),
        r#"{"cat":0.9,"hat":0.5,"bat":0.3,"act":0.2,"cart":0.1}"#,
    )
    .unwrap();
    std::fs::write(
        game_data.join("anagrams.json"),
        r#"{"70":["cat","act"]}"#,
    )
    .unwrap();

    let cmudict_path = dir.join("cmudict.txt");
    let mut f = std::fs::File::create(&cmudict_path).unwrap();
    writeln!(f, "CAT  K AE1 T").unwrap();
    writeln!(f, "HAT  HH AE1 T").unwrap();
    writeln!(f, "BAT  B AE1 T").unwrap();
    writeln!(f, "ACT  AE1 K T").unwrap();
    writeln!(f, "CART  K AA1 R T").unwrap();

    let mut config = Config::default();
    config.game_data_dir = game_data;
    config.storage.mode = StorageMode::MemoryOnly;

    let model = Box::new(DeterministicModelAdapter::new(256));
    Engine::initialize(config, &cmudict_path, model).unwrap()
}

#[test]
fn scoring_a_rhyme_and_an_anagram_both_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = fixture_engine(dir.path());
    let scorer = engine.scorer().unwrap();

    let rhyme = scorer.score("cat", "hat").unwrap();
    assert!(rhyme.total_score > 0.0);
    assert!(rhyme.per_category.iter().all(|c| (0.0..=1.0).contains(&c.creativity)));

    let anagram = scorer.score("cat", "act").unwrap();
    assert!(anagram.per_category.iter().any(|c| c.category == wurdo_core::Category::Ana));
}

#[test]
fn scoring_a_non_transformation_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = fixture_engine(dir.path());
    let scorer = engine.scorer().unwrap();

    let err = scorer.score("cat", "cart").is_err() || scorer.score("cat", "dog").is_err();
    assert!(err);
    match scorer.score("cat", "zzzzz") {
        Err(Error::NotATransformation(_, _)) => {}
        other => panic!("expected NotATransformation, got {other:?}"),
    }
}

#[test]
fn game_coordinator_tracks_two_independent_chains() {
    let dir = tempfile::tempdir().unwrap();
    let engine = fixture_engine(dir.path());
    let scorer = engine.scorer().unwrap();
    let mut game = GameCoordinator::new(&scorer, "cat");

    game.play(Player::You, "hat").unwrap();
    game.play(Player::Umi, "act").unwrap();

    assert_eq!(game.chain(Player::You).len(), 1);
    assert_eq!(game.chain(Player::Umi).len(), 1);
    assert_eq!(game.chain(Player::You)[0].word, "hat");
    assert_eq!(game.chain(Player::Umi)[0].word, "act");

    let transform_engine = engine.transformation_engine();
    let set = transform_engine.transform("cat").unwrap();
    let suggestions = game.suggestions(&engine.lexicon, &set);
    // "hat" and "act" are already used, so suggestions should never repeat them.
    assert!(suggestions.iter().all(|(_, w)| w != "hat" && w != "act"));
}
