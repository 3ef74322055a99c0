use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use tinsel::renderer::{sample_step, Renderer, RenderStatus};
use tinsel::thread_pool::ThreadPool;

struct Options {
    scene_path: PathBuf,
    threads: Option<usize>,
    spp: Option<u32>,
    resume: Option<PathBuf>,
    output: Option<PathBuf>,
}

fn parse_args() -> Result<Options, String> {
    let mut args = std::env::args().skip(1);
    let mut options = Options {
        scene_path: PathBuf::new(),
        threads: None,
        spp: None,
        resume: None,
        output: None,
    };

    let mut scene_path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--threads" => {
                let value = args.next().ok_or("--threads expects a number")?;
                options.threads =
                    Some(value.parse().map_err(|_| "--threads expects a number")?);
            }
            "--spp" => {
                let value = args.next().ok_or("--spp expects a number")?;
                options.spp = Some(value.parse().map_err(|_| "--spp expects a number")?);
            }
            "--resume" => {
                options.resume = Some(PathBuf::from(args.next().ok_or("--resume expects a path")?));
            }
            "--output" => {
                options.output = Some(PathBuf::from(args.next().ok_or("--output expects a path")?));
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown flag '{}'", other));
            }
            other => {
                if scene_path.replace(PathBuf::from(other)).is_some() {
                    return Err("more than one scene file given".into());
                }
            }
        }
    }

    options.scene_path = scene_path.ok_or_else(|| {
        "usage: tinsel <scene.json> [--threads N] [--spp N] [--resume PATH] [--output PATH]"
            .to_string()
    })?;
    Ok(options)
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    let mut scene = match tinsel::loader::load(&options.scene_path) {
        Ok(scene) => scene,
        Err(error) => {
            eprintln!("failed to load scene: {:#}", error);
            std::process::exit(1);
        }
    };

    if let Some(spp) = options.spp {
        scene.settings.spp = spp;
    }
    if let Some(output) = &options.output {
        scene.settings.output_path = output.clone();
    }
    if let Some(resume) = &options.resume {
        scene.settings.resume_file = Some(resume.clone());
    }

    println!("Preparing scene...");
    scene.prepare_for_render();

    let settings = scene.settings.clone();
    let thread_count = options.threads.unwrap_or_else(num_cpus::get);
    let pool = Arc::new(ThreadPool::new(thread_count));
    let renderer = Renderer::new(Arc::new(scene), pool);

    let mut current_spp = 0;
    if let Some(resume_file) = &settings.resume_file {
        if resume_file.exists() {
            match renderer.load_resume(resume_file) {
                Ok(spp) => {
                    current_spp = spp;
                    println!("Resumed at {} spp from '{}'", spp, resume_file.display());
                }
                Err(error) => {
                    eprintln!("ignoring resume state: {:#}", error);
                }
            }
        }
    }

    println!(
        "Rendering {} spp on {} threads ({} tiles)...",
        settings.spp,
        thread_count,
        renderer.tile_count()
    );
    let progress = indicatif::ProgressBar::new(u64::from(settings.spp));
    progress.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} spp (eta: {eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.set_position(u64::from(current_spp));

    while current_spp < settings.spp {
        let next_spp = sample_step(current_spp, settings.spp);

        let (status_tx, status_rx) = mpsc::channel();
        renderer.start_render(
            move |status| {
                let _ = status_tx.send(status);
            },
            current_spp,
            next_spp,
        );
        renderer.wait_for_completion();

        match status_rx.recv() {
            Ok(RenderStatus::Finished) => {}
            Ok(RenderStatus::Aborted) => {
                progress.abandon();
                eprintln!("render aborted");
                std::process::exit(2);
            }
            Ok(RenderStatus::Failed(message)) => {
                progress.abandon();
                eprintln!("render failed: {}", message);
                std::process::exit(2);
            }
            Err(_) => {
                progress.abandon();
                eprintln!("render worker disappeared");
                std::process::exit(2);
            }
        }

        current_spp = next_spp;
        progress.set_position(u64::from(current_spp));

        // Checkpoint after every pass so long renders stay inspectable and
        // resumable.
        if let Err(error) = renderer
            .scene()
            .camera
            .film()
            .write_png(&settings.output_path)
        {
            progress.abandon();
            eprintln!("{:#}", error);
            std::process::exit(3);
        }
        if let Some(resume_file) = &settings.resume_file {
            if let Err(error) = renderer.save_resume(resume_file, current_spp) {
                eprintln!("warning: {:#}", error);
            }
        }
    }
    progress.finish();

    if let Some(hdr_path) = &settings.hdr_output_path {
        if let Err(error) = renderer.scene().camera.film().write_hdr(hdr_path) {
            eprintln!("{:#}", error);
            std::process::exit(3);
        }
    }
    if let Some(variance_path) = &settings.variance_output_path {
        if let Err(error) = renderer.write_variance_png(variance_path) {
            eprintln!("{:#}", error);
            std::process::exit(3);
        }
    }

    let rejected = renderer.rejected_sample_count();
    if rejected > 0 {
        println!("Done; clamped {} non-finite samples.", rejected);
    } else {
        println!("Done.");
    }
}
