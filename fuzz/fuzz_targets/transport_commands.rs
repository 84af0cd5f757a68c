#![no_main]

use libfuzzer_sys::fuzz_target;
use podcastr::core::TransportController;
use podcastr::model::Episode;

fuzz_target!(|data: &[u8]| {
    let mut core = TransportController::with_seed(data.len() as u64);
    let len = data.len() % 16;
    let episodes: Vec<Episode> = (0..len)
        .map(|idx| Episode {
            title: format!("episode_{idx}"),
            thumbnail: String::new(),
            members: String::new(),
            published_at: String::new(),
            duration: idx as u32 * 10,
            url: format!("episode_{idx}.mp3"),
        })
        .collect();

    for (step, byte) in data.iter().enumerate() {
        match byte % 11 {
            0 => core.load_queue(episodes.clone(), usize::from(*byte)),
            1 => {
                if let Some(first) = episodes.first() {
                    core.load_single(first.clone());
                }
            }
            2 => core.toggle_pause(),
            3 => core.toggle_loop(),
            4 => core.toggle_shuffle(),
            5 => core.report_playing(step % 2 == 0),
            6 => core.next(),
            7 => core.previous(),
            8 => core.on_playback_ended(),
            9 => {
                let _ = core.seek(u32::from(*byte));
            }
            _ => core.clear(),
        }

        match core.current_index() {
            Some(idx) => assert!(idx < core.queue().len()),
            None => assert!(!core.is_playing()),
        }
    }
});
