//! Instance creation: fetch image, import, update, add user, add repositories, log in.

use rand_core::RngCore;

use crate::backend::{Fetcher, Manager, WslVersion};
use crate::config::validate_release;
use crate::error::WslDevError;
use crate::host::{Arch, check_release};
use crate::image::ImageCache;
use crate::instance::{Context, Instance, storage_ids};
use crate::naming::unique_id;
use crate::progress::StepProgress;

const ROOT: &str = "root";

const APT_UPDATE: &[&str] = &["apt-get", "update"];

const APT_UPGRADE: &[&str] = &[
    "env",
    "DEBIAN_FRONTEND=noninteractive",
    "apt-get",
    "full-upgrade",
    "-y",
];

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub release: String,
    pub version: WslVersion,
    /// Re-download the image even when it is cached.
    pub force: bool,
    pub no_update: bool,
    /// Skip creating a non-root user.
    pub root_only: bool,
    /// Extra package repositories, added in order.
    pub additional_ppa: Vec<String>,
    /// Hand the terminal to a login shell when done.
    pub shell: bool,
}

impl CreateRequest {
    pub fn new(release: impl Into<String>, version: WslVersion) -> Self {
        Self {
            release: release.into(),
            version,
            force: false,
            no_update: false,
            root_only: false,
            additional_ppa: Vec::new(),
            shell: true,
        }
    }

    fn step_count(&self) -> usize {
        3 + usize::from(!self.no_update) + usize::from(!self.root_only) + self.additional_ppa.len()
    }
}

/// Commands (run as root) that add `user` with passwordless login and sudo.
pub fn user_commands(user: &str, groups: &[String]) -> Vec<Vec<String>> {
    let sudoers = format!("/etc/sudoers.d/{user}");
    vec![
        vec![
            "useradd".into(),
            "--create-home".into(),
            "--shell".into(),
            "/bin/bash".into(),
            user.into(),
        ],
        vec!["passwd".into(), "--delete".into(), user.into()],
        vec![
            "sh".into(),
            "-c".into(),
            format!(
                "printf '%s ALL=(ALL) NOPASSWD:ALL\\n' '{user}' > {sudoers} && chmod 0440 {sudoers}"
            ),
        ],
        vec![
            "usermod".into(),
            "--append".into(),
            "--groups".into(),
            groups.join(","),
            user.into(),
        ],
    ]
}

async fn run_as_root<M: Manager>(manager: &M, name: &str, command: &[&str]) -> Result<(), WslDevError> {
    manager.run(name, Some(ROOT), command).await
}

async fn update_packages<M: Manager>(manager: &M, name: &str) -> Result<(), WslDevError> {
    run_as_root(manager, name, APT_UPDATE).await?;
    run_as_root(manager, name, APT_UPGRADE).await
}

/// Provision a new instance.
///
/// Every step runs in order and the first failure aborts the whole
/// operation; nothing created up to that point is cleaned up.
pub async fn create<M, F, R>(
    ctx: &Context<'_, M, F>,
    request: &CreateRequest,
    rng: &mut R,
    progress: &mut StepProgress,
) -> Result<Instance, WslDevError>
where
    M: Manager,
    F: Fetcher,
    R: RngCore + ?Sized,
{
    let settings = ctx.settings;
    let release = request.release.as_str();
    progress.set_total(request.step_count());

    // 1. Host checks, all before any download.
    let arch = Arch::parse(&ctx.host.arch)?;
    validate_release(release)?;
    check_release(release, arch)?;
    let user = if request.root_only {
        None
    } else {
        Some(ctx.host.linux_user()?)
    };
    progress.skip(&format!("Host supports {release} ({arch})"));

    // 2. Directories.
    for dir in [&settings.cache_dir, &settings.instance_root] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| WslDevError::Io {
                context: format!("creating directory {}", dir.display()),
                source: e,
            })?;
    }

    // 3. Image.
    let cache = ImageCache::new(&settings.cache_dir, &settings.image_url);
    let cached = !request.force && cache.path(release, arch).exists();
    let label = if cached {
        format!("Using cached {release} image")
    } else {
        format!("Downloading {release} image")
    };
    let image = progress
        .run(&label, |step| async move {
            let path = cache.ensure(ctx.fetcher, release, arch, request.force).await?;
            if !cached {
                step.set_done_label(format!("Downloaded {release} image"));
            }
            Ok::<_, WslDevError>(path)
        })
        .await?;

    // 4. Name, unique against the manager and the storage root.
    let mut taken = ctx.manager.list().await?;
    taken.extend(storage_ids(&settings.instance_root, &settings.prefix)?);
    let id = unique_id(rng, &settings.prefix, &taken);
    let name = ctx.instance_name(&id);
    let dir = ctx.instance_dir(&id);
    tracing::info!(%id, %name, dir = %dir.display(), "creating instance");

    // 5. Import.
    progress
        .run(&format!("Importing {name} (WSL {})", request.version), |_| async {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| WslDevError::Io {
                    context: format!("creating instance dir {}", dir.display()),
                    source: e,
                })?;
            ctx.manager.import(&name, &dir, &image, request.version).await
        })
        .await?;
    progress.info(&format!("storage: {}", dir.display()));

    // 6. Update.
    if !request.no_update {
        progress
            .run("Updating packages", |_| update_packages(ctx.manager, &name))
            .await?;
    }

    // 7. User.
    if let Some(user) = &user {
        progress
            .run(&format!("Creating user {user}"), |_| async {
                for command in user_commands(user, &settings.groups) {
                    let args: Vec<&str> = command.iter().map(String::as_str).collect();
                    run_as_root(ctx.manager, &name, &args).await?;
                }
                Ok::<_, WslDevError>(())
            })
            .await?;
    }

    // 8. Extra repositories.
    for repo in &request.additional_ppa {
        progress
            .run(&format!("Adding repository {repo}"), |_| async {
                run_as_root(ctx.manager, &name, &["add-apt-repository", "--yes", repo.as_str()]).await?;
                update_packages(ctx.manager, &name).await
            })
            .await?;
    }

    let login = user.as_deref().unwrap_or(ROOT);
    let instance = Instance { id, name, dir };
    progress.println(&format!("Instance {} is ready.", instance.name));

    // 9. Shell.
    if request.shell {
        progress.println(&format!("Entering {} as {login}...", instance.name));
        ctx.manager.shell(&instance.name, Some(login)).await?;
    } else {
        progress.println(&format!(
            "Enter it with: {} --distribution {} --user {login}",
            settings.wsl_command, instance.name
        ));
    }

    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::tests::{Call, Fixture};
    use crate::naming::tests::ScriptedRng;
    use crate::progress::OutputMode;

    fn request() -> CreateRequest {
        CreateRequest {
            shell: false,
            ..CreateRequest::new("focal", WslVersion::V2)
        }
    }

    async fn run(fx: &Fixture, request: &CreateRequest) -> Result<Instance, WslDevError> {
        // Distinct ids on every draw, starting with "ABCDEFGHIJ".
        let mut rng = ScriptedRng::new((0..52).collect());
        let mut progress = StepProgress::new(0, OutputMode::Silent);
        create(&fx.ctx(), request, &mut rng, &mut progress).await
    }

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn full_sequence_in_order() {
        let fx = Fixture::new();
        let mut req = request();
        req.additional_ppa = vec!["ppa:deadsnakes/ppa".into(), "ppa:git-core/ppa".into()];
        req.shell = true;

        let instance = run(&fx, &req).await.unwrap();

        assert_eq!(instance.id, "ABCDEFGHIJ");
        assert_eq!(instance.name, "wsldev-ABCDEFGHIJ");
        assert_eq!(instance.dir, fx.settings.instance_root.join("wsldev-ABCDEFGHIJ"));
        assert!(instance.dir.join("ext4.vhdx").exists());

        let calls = fx.manager.calls();
        assert_eq!(calls[0], Call::List);
        assert_eq!(
            calls[1],
            Call::Import {
                name: instance.name.clone(),
                storage: instance.dir.clone(),
                image: fx.settings.cache_dir.join("focal/ubuntu-focal-wsl-amd64-wsl.rootfs.tar.gz"),
                version: WslVersion::V2,
            }
        );

        let mut expected = vec![strs(APT_UPDATE), strs(APT_UPGRADE)];
        expected.extend(user_commands("alice", &fx.settings.groups));
        for repo in ["ppa:deadsnakes/ppa", "ppa:git-core/ppa"] {
            expected.push(strs(&["add-apt-repository", "--yes", repo]));
            expected.push(strs(APT_UPDATE));
            expected.push(strs(APT_UPGRADE));
        }
        assert_eq!(fx.manager.runs(), expected);

        for call in &calls {
            if let Call::Run { name, user, .. } = call {
                assert_eq!(name, &instance.name);
                assert_eq!(user.as_deref(), Some("root"));
            }
        }

        assert_eq!(
            calls.last().unwrap(),
            &Call::Shell {
                name: instance.name.clone(),
                user: Some("alice".into()),
            }
        );
        assert_eq!(fx.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn unsupported_arch_fails_before_download() {
        let mut fx = Fixture::new();
        fx.host.arch = "riscv64".into();

        let err = run(&fx, &request()).await.unwrap_err();

        assert!(matches!(err, WslDevError::UnsupportedArchitecture { .. }));
        assert_eq!(fx.fetcher.calls(), 0);
        assert!(fx.manager.calls().is_empty());
    }

    #[tokio::test]
    async fn incompatible_release_fails_before_download() {
        let mut fx = Fixture::new();
        fx.host.arch = "ARM64".into();
        let req = CreateRequest {
            release: "bionic".into(),
            ..request()
        };

        let err = run(&fx, &req).await.unwrap_err();

        assert!(matches!(err, WslDevError::UnsupportedReleaseArchitecture { .. }));
        assert_eq!(fx.fetcher.calls(), 0);
        assert!(fx.manager.calls().is_empty());
    }

    #[tokio::test]
    async fn both_architectures_pass_validation() {
        for arch in ["AMD64", "x86_64", "ARM64", "aarch64"] {
            let mut fx = Fixture::new();
            fx.host.arch = arch.into();
            run(&fx, &request()).await.unwrap();
            assert_eq!(fx.fetcher.calls(), 1, "{arch}");
        }
    }

    #[tokio::test]
    async fn cached_image_is_reused_unless_forced() {
        let fx = Fixture::new();
        run(&fx, &request()).await.unwrap();
        run(&fx, &request()).await.unwrap();
        assert_eq!(fx.fetcher.calls(), 1);

        let forced = CreateRequest {
            force: true,
            ..request()
        };
        run(&fx, &forced).await.unwrap();
        assert_eq!(fx.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn no_update_skips_apt() {
        let fx = Fixture::new();
        let req = CreateRequest {
            no_update: true,
            ..request()
        };
        run(&fx, &req).await.unwrap();

        let runs = fx.manager.runs();
        assert!(!runs.iter().any(|c| c.contains(&"apt-get".to_string())));
        assert_eq!(runs, user_commands("alice", &fx.settings.groups));
    }

    #[tokio::test]
    async fn update_runs_once_before_user_creation() {
        let fx = Fixture::new();
        run(&fx, &request()).await.unwrap();

        let runs = fx.manager.runs();
        assert_eq!(runs[0], strs(APT_UPDATE));
        assert_eq!(runs[1], strs(APT_UPGRADE));
        assert_eq!(runs[2][0], "useradd");
        assert_eq!(runs.iter().filter(|c| **c == strs(APT_UPDATE)).count(), 1);
    }

    #[tokio::test]
    async fn root_only_skips_user_and_logs_in_as_root() {
        let fx = Fixture::new();
        let req = CreateRequest {
            root_only: true,
            shell: true,
            ..request()
        };
        run(&fx, &req).await.unwrap();

        let runs = fx.manager.runs();
        assert_eq!(runs, vec![strs(APT_UPDATE), strs(APT_UPGRADE)]);
        assert!(matches!(
            fx.manager.calls().last(),
            Some(Call::Shell { user: Some(u), .. }) if u == "root"
        ));
    }

    #[tokio::test]
    async fn root_only_tolerates_unusual_host_user() {
        let mut fx = Fixture::new();
        fx.host.user = "John Smith".into();
        let req = CreateRequest {
            root_only: true,
            ..request()
        };
        run(&fx, &req).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_host_user_fails_before_download() {
        let mut fx = Fixture::new();
        fx.host.user = "John Smith".into();
        let err = run(&fx, &request()).await.unwrap_err();
        assert!(matches!(err, WslDevError::Validation { .. }));
        assert_eq!(fx.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn generated_name_avoids_existing_instances() {
        let fx = Fixture::new();
        fx.existing("AAAAAAAAAA");
        fx.manager.listing.borrow_mut().push("wsldev-BBBBBBBBBB".into());

        let mut script = vec![0u8; 10];
        script.extend(vec![1u8; 10]);
        script.extend(vec![2u8; 10]);
        let mut rng = ScriptedRng::new(script);
        let mut progress = StepProgress::new(0, OutputMode::Silent);
        let instance = create(&fx.ctx(), &request(), &mut rng, &mut progress)
            .await
            .unwrap();

        assert_eq!(instance.id, "CCCCCCCCCC");
    }

    #[tokio::test]
    async fn import_failure_aborts_without_cleanup() {
        let mut fx = Fixture::new();
        fx.manager.fail_on = Some("import");

        let err = run(&fx, &request()).await.unwrap_err();

        assert!(matches!(err, WslDevError::ExternalCommand { .. }));
        assert!(fx.manager.runs().is_empty());
        // The storage dir created for the import is left in place.
        assert!(fx.ctx().instance_dir("ABCDEFGHIJ").exists());
    }

    #[tokio::test]
    async fn failing_update_stops_before_user_creation() {
        let mut fx = Fixture::new();
        fx.manager.fail_on = Some("apt-get");

        assert!(run(&fx, &request()).await.is_err());
        assert_eq!(fx.manager.runs(), vec![strs(APT_UPDATE)]);
    }

    #[tokio::test]
    async fn invalid_release_is_rejected() {
        let fx = Fixture::new();
        let req = CreateRequest {
            release: "../evil".into(),
            ..request()
        };
        let err = run(&fx, &req).await.unwrap_err();
        assert!(matches!(err, WslDevError::Validation { .. }));
        assert_eq!(fx.fetcher.calls(), 0);
    }

    #[test]
    fn user_commands_cover_the_whole_sequence() {
        let groups = vec!["adm".to_string(), "sudo".to_string()];
        let cmds = user_commands("alice", &groups);
        assert_eq!(cmds.len(), 4);
        assert_eq!(cmds[0], strs(&["useradd", "--create-home", "--shell", "/bin/bash", "alice"]));
        assert_eq!(cmds[1], strs(&["passwd", "--delete", "alice"]));
        assert!(cmds[2][2].contains("NOPASSWD:ALL"));
        assert!(cmds[2][2].contains("/etc/sudoers.d/alice"));
        assert_eq!(cmds[3], strs(&["usermod", "--append", "--groups", "adm,sudo", "alice"]));
    }

    #[test]
    fn step_count_tracks_options() {
        let mut req = request();
        assert_eq!(req.step_count(), 5);
        req.no_update = true;
        req.root_only = true;
        req.additional_ppa = vec!["a".into(), "b".into()];
        assert_eq!(req.step_count(), 5);
    }
}
