use vergen::Emitter;
use vergen_git2::Git2Builder;

/// Emits the git describe string and commit sha shown by `--version`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let git = Git2Builder::default()
        .describe(true, true, None)
        .sha(true)
        .build();

    match git {
        Ok(git) => {
            Emitter::default().add_instructions(&git)?.emit()?;
        }
        Err(_) => {
            // Source tarballs have no repository to describe.
            println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE=unknown");
            println!("cargo:rustc-env=VERGEN_GIT_SHA=unknown");
        }
    }

    Ok(())
}
