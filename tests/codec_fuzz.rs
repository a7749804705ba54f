use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stomp_ws::{Command, Frame, decode, encode};

const ALPHABET: &[char] = &[
    'a', 'Z', '0', ':', '\n', '\r', '\0', ' ', '/', '{', '"', 'é', '✓',
];

fn random_text(rng: &mut StdRng, max_len: usize) -> String {
    let len = rng.gen_range(0..max_len);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

/// Arbitrary text must never make the decoder panic. The RNG is seeded so
/// the test is deterministic.
#[test]
fn decode_never_panics_on_random_input() {
    let mut rng = StdRng::from_seed([0x42; 32]);
    for _ in 0..5_000 {
        let text = random_text(&mut rng, 64);
        if let Some(frame) = decode(&text) {
            // empty bodies are reported as None
            if let Some(body) = &frame.body {
                assert!(!body.is_empty());
            }
        }
    }
}

/// Frames whose header keys and values avoid the reserved characters survive
/// an encode/decode cycle, whatever their body holds.
#[test]
fn random_frames_survive_encoding() {
    let mut rng = StdRng::from_seed([0x99; 32]);
    let commands = [
        Command::Send,
        Command::Message,
        Command::Subscribe,
        Command::Receipt,
        Command::Error,
    ];

    for i in 0..500 {
        let mut frame = Frame::new(commands[i % commands.len()]);
        for h in 0..rng.gen_range(0..5) {
            let value: String = random_text(&mut rng, 12)
                .chars()
                .filter(|c| !matches!(c, '\n' | '\r'))
                .collect();
            frame = frame.header(format!("h{}", h), value);
        }
        // bodies may contain anything except a trailing NUL or line ending
        let body: String = random_text(&mut rng, 40)
            .trim_end_matches(['\0', '\r', '\n'])
            .to_string();
        if !body.is_empty() {
            frame = frame.set_body(body);
        }

        let decoded = decode(&encode(&frame)).expect("frame");
        assert_eq!(decoded, frame, "iteration {}", i);
    }
}
