use textpiece::tokenizer::pre_tokenizers::WhitespaceSplit;
use textpiece::tokenizer::processors::BertProcessing;
use textpiece::{PaddingDirection, PaddingParams, Tokenizer, WordLevel};

fn tokenizer() -> Tokenizer {
    let vocab = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "the", "cat", "sat", "on", "mat"]
        .into_iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), i as u32))
        .collect();
    let model = WordLevel::builder()
        .vocab(vocab)
        .unk_token("[UNK]".into())
        .build()
        .unwrap();
    let mut tokenizer = Tokenizer::builder()
        .with_model(model)
        .with_pre_tokenizer(Some(WhitespaceSplit.into()))
        .with_post_processor(Some(
            BertProcessing::new(("[SEP]".into(), 3), ("[CLS]".into(), 2)).into(),
        ))
        .with_padding(Some(PaddingParams::default()))
        .build()
        .unwrap();
    tokenizer
        .add_special_tokens(&[
            textpiece::AddedToken::from("[CLS]", true),
            textpiece::AddedToken::from("[SEP]", true),
            textpiece::AddedToken::from("[PAD]", true),
        ])
        .unwrap();
    tokenizer
}

#[test]
fn batch_is_padded_to_the_longest() {
    let tokenizer = tokenizer();
    let encodings = tokenizer
        .encode_batch(vec!["the cat", "the cat sat on the mat", "dog"], true)
        .unwrap();
    assert!(encodings.iter().all(|e| e.len() == 8));
    assert_eq!(encodings[0].get_ids(), &[2, 4, 5, 3, 0, 0, 0, 0]);
    assert_eq!(encodings[0].get_attention_mask(), &[1, 1, 1, 1, 0, 0, 0, 0]);
    assert_eq!(encodings[2].get_tokens()[1], "[UNK]");

    // Same as encoding one by one, apart from the padding.
    for (input, batched) in ["the cat", "the cat sat on the mat"].iter().zip(&encodings) {
        let single = tokenizer.encode(*input, true).unwrap();
        assert_eq!(&batched.get_ids()[..single.len()], single.get_ids());
    }
}

#[test]
fn left_padding() {
    let mut tokenizer = tokenizer();
    tokenizer
        .with_padding(Some(PaddingParams {
            direction: PaddingDirection::Left,
            pad_to_multiple_of: Some(4),
            ..Default::default()
        }))
        .unwrap();
    let encodings = tokenizer
        .encode_batch(vec!["the", "the cat sat"], true)
        .unwrap();
    assert_eq!(encodings[0].get_ids(), &[0, 0, 0, 0, 0, 2, 4, 3]);
    assert_eq!(encodings[1].get_ids(), &[0, 0, 0, 2, 4, 5, 6, 3]);
    assert_eq!(encodings[1].get_special_tokens_mask(), &[1, 1, 1, 1, 0, 0, 0, 1]);
}

#[test]
fn pad_to_multiple_of_zero_is_rejected() {
    let mut tokenizer = tokenizer();
    assert!(
        tokenizer
            .with_padding(Some(PaddingParams {
                pad_to_multiple_of: Some(0),
                ..Default::default()
            }))
            .is_err()
    );
}

#[test]
fn decode_batch_matches_decode() {
    let tokenizer = tokenizer();
    let encodings = tokenizer
        .encode_batch(vec!["the cat sat", "on the mat"], true)
        .unwrap();
    let ids = encodings.iter().map(|e| e.get_ids()).collect::<Vec<_>>();
    let decoded = tokenizer.decode_batch(&ids, true).unwrap();
    assert_eq!(decoded, vec!["the cat sat", "on the mat"]);
    for (ids, text) in ids.iter().zip(&decoded) {
        assert_eq!(&tokenizer.decode(ids, true).unwrap(), text);
    }

    let raw = tokenizer.decode_batch(&ids, false).unwrap();
    assert_eq!(raw[0], "[CLS] the cat sat [SEP]");
}

#[test]
fn empty_batch_gives_no_encodings() {
    let tokenizer = tokenizer();
    let empty: Vec<&str> = vec![];
    assert!(tokenizer.encode_batch(empty, true).unwrap().is_empty());
}

#[test]
fn serial_batches_match_parallel_ones() {
    let tokenizer = tokenizer();
    let inputs = vec!["the cat", "sat on", "the mat", "cat"];
    textpiece::set_parallelism(true);
    let parallel = tokenizer.encode_batch(inputs.clone(), true).unwrap();
    textpiece::set_parallelism(false);
    let serial = tokenizer.encode_batch(inputs, true).unwrap();
    textpiece::set_parallelism(true);
    assert_eq!(parallel, serial);
}
