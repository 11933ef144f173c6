// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 crossflow contributors

//! Init command - write a cross-toolchain pipeline

use colored::Colorize;
use miette::Result;
use std::path::Path;

const BINUTILS_VERSION: &str = "2.42";
const GCC_VERSION: &str = "13.2.0";
const LINUX_VERSION: &str = "6.6.30";
const GLIBC_VERSION: &str = "2.39";

/// Run the init command
pub async fn run(pipeline_path: &Path, target: String, force: bool, verbose: bool) -> Result<()> {
    println!("{}", "Initializing crossflow pipeline...".bold());
    println!();

    if pipeline_path.exists() && !force {
        return Err(miette::miette!(
            help = "Use --force to overwrite it",
            "{} already exists",
            pipeline_path.display()
        ));
    }

    let arch = target.split('-').next().unwrap_or_default();
    if arch.is_empty() || !target.contains('-') {
        return Err(miette::miette!(
            help = "Targets look like aarch64-linux-gnu or riscv64-linux-gnu",
            "'{}' is not a target triple",
            target
        ));
    }

    let pipeline_content = generate_toolchain_template(&target);

    if let Some(parent) = pipeline_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            miette::miette!("Failed to create directory '{}': {}", parent.display(), e)
        })?;
    }
    std::fs::write(pipeline_path, &pipeline_content).map_err(|e| {
        miette::miette!("Failed to write {}: {}", pipeline_path.display(), e)
    })?;

    println!("  {} Created {}", "✓".green(), pipeline_path.display());
    println!("  {} Target {} (kernel arch {})", "→".blue(), target.cyan(), linux_arch(&target));

    println!();
    println!("{}", "Pipeline initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Review versions and configure flags in {}", pipeline_path.display().to_string().cyan());
    println!("  2. Run {} to check the pipeline", "crossflow validate".cyan());
    println!("  3. Run {} to build the toolchain (rerun to resume)", "crossflow run".cyan());
    println!();

    if verbose {
        println!("{}", "Generated pipeline:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", pipeline_content.dimmed());
    }

    Ok(())
}

/// Kernel `ARCH` for a target triple
pub fn linux_arch(target: &str) -> &str {
    let arch = target.split('-').next().unwrap_or(target);
    match arch {
        "aarch64" | "aarch64_be" => "arm64",
        "x86_64" | "i386" | "i486" | "i586" | "i686" => "x86",
        "riscv32" | "riscv64" => "riscv",
        "powerpc" | "powerpc64" | "powerpc64le" | "ppc" | "ppc64" | "ppc64le" => "powerpc",
        a if a.starts_with("arm") => "arm",
        a if a.starts_with("mips") => "mips",
        "s390x" => "s390",
        "sparc64" => "sparc",
        a => a,
    }
}

/// The canonical bootstrap chain for a GNU/Linux cross toolchain
pub fn generate_toolchain_template(target: &str) -> String {
    let arch = linux_arch(target);
    format!(
        r#"# crossflow pipeline - {target} cross toolchain
#
# Each stage runs once. Completed stages are recorded under .crossflow/state
# and skipped on the next run; use `crossflow reset <stage> --cascade` to
# rebuild a stage and everything after it.

version: "1"
name: "cross-{target}"
description: "GCC {gcc} / binutils {binutils} / glibc {glibc} for {target}"

env:
  TARGET: "{target}"
  LINUX_ARCH: "{arch}"

stages:
  # Downloads
  - name: fetch-binutils
    action:
      type: fetch
      url: https://ftp.gnu.org/gnu/binutils/binutils-{binutils}.tar.xz
  - name: fetch-gcc
    action:
      type: fetch
      url: https://ftp.gnu.org/gnu/gcc/gcc-{gcc}/gcc-{gcc}.tar.xz
  - name: fetch-linux
    action:
      type: fetch
      url: https://cdn.kernel.org/pub/linux/kernel/v6.x/linux-{linux}.tar.xz
  - name: fetch-glibc
    action:
      type: fetch
      url: https://ftp.gnu.org/gnu/glibc/glibc-{glibc}.tar.xz

  # Canonical source trees (src/<component>)
  - name: binutils-src
    action:
      type: extract
      archive: archives/binutils-{binutils}.tar.xz
      component: binutils
  - name: gcc-src
    action:
      type: extract
      archive: archives/gcc-{gcc}.tar.xz
      component: gcc
  - name: linux-src
    action:
      type: extract
      archive: archives/linux-{linux}.tar.xz
      component: linux
  - name: glibc-src
    action:
      type: extract
      archive: archives/glibc-{glibc}.tar.xz
      component: glibc

  # GCC's bundled math libraries are fetched into its source tree.
  - name: gcc-prerequisites
    depends_on: [gcc-src]
    action:
      type: shell
      workdir: src/gcc
      command: ./contrib/download_prerequisites

  # Assembler and linker come first: every later compiler needs them.
  - name: binutils
    depends_on: [binutils-src]
    action:
      type: shell
      component: binutils
      command: |
        set -e
        "$CROSSFLOW_SOURCES/binutils/configure" --prefix="$CROSSFLOW_PREFIX" \
          --target="$TARGET" --disable-multilib --disable-nls --disable-werror
        make -j"$CROSSFLOW_JOBS"
        make install

  # Kernel headers are needed to configure the C library.
  - name: linux-headers
    depends_on: [linux-src]
    action:
      type: shell
      workdir: src/linux
      command: make ARCH="$LINUX_ARCH" INSTALL_HDR_PATH="$CROSSFLOW_PREFIX/$TARGET" headers_install

  # A C compiler that needs no target C library yet.
  - name: gcc-stage1
    depends_on: [binutils, linux-headers, gcc-prerequisites]
    action:
      type: shell
      component: gcc
      command: |
        set -e
        "$CROSSFLOW_SOURCES/gcc/configure" --prefix="$CROSSFLOW_PREFIX" \
          --target="$TARGET" --enable-languages=c,c++ --disable-multilib --disable-nls
        make -j"$CROSSFLOW_JOBS" all-gcc
        make install-gcc

  # glibc headers and startup files, then libgcc, then the full library.
  - name: libc
    depends_on: [gcc-stage1, glibc-src]
    action:
      type: shell
      component: glibc
      command: |
        set -e
        "$CROSSFLOW_SOURCES/glibc/configure" --prefix="$CROSSFLOW_PREFIX/$TARGET" \
          --build="$(gcc -dumpmachine)" --host="$TARGET" --target="$TARGET" \
          --with-headers="$CROSSFLOW_PREFIX/$TARGET/include" --disable-multilib \
          libc_cv_forced_unwind=yes
        make install-bootstrap-headers=yes install-headers
        make -j"$CROSSFLOW_JOBS" csu/subdir_lib
        install csu/crt1.o csu/crti.o csu/crtn.o "$CROSSFLOW_PREFIX/$TARGET/lib"
        "$TARGET-gcc" -nostdlib -nostartfiles -shared -x c /dev/null \
          -o "$CROSSFLOW_PREFIX/$TARGET/lib/libc.so"
        touch "$CROSSFLOW_PREFIX/$TARGET/include/gnu/stubs.h"
        make -C "$CROSSFLOW_BUILD/gcc" -j"$CROSSFLOW_JOBS" all-target-libgcc
        make -C "$CROSSFLOW_BUILD/gcc" install-target-libgcc
        make -j"$CROSSFLOW_JOBS"
        make install

  # The final compiler, with the C++ runtime built against the new libc.
  - name: gcc-final
    depends_on: [libc]
    action:
      type: shell
      component: gcc
      command: |
        set -e
        make -j"$CROSSFLOW_JOBS"
        make install
"#,
        target = target,
        arch = arch,
        binutils = BINUTILS_VERSION,
        gcc = GCC_VERSION,
        linux = LINUX_VERSION,
        glibc = GLIBC_VERSION,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::ArtifactFetcher;
    use crate::pipeline::{Pipeline, PipelinePlan, PipelineValidator};

    #[test]
    fn test_linux_arch() {
        assert_eq!(linux_arch("aarch64-linux-gnu"), "arm64");
        assert_eq!(linux_arch("arm-linux-gnueabihf"), "arm");
        assert_eq!(linux_arch("riscv64-linux-gnu"), "riscv");
        assert_eq!(linux_arch("x86_64-linux-gnu"), "x86");
        assert_eq!(linux_arch("m68k-linux-gnu"), "m68k");
    }

    #[test]
    fn test_template_is_valid() {
        let yaml = generate_toolchain_template("aarch64-linux-gnu");
        let pipeline = Pipeline::from_yaml(&yaml).unwrap();
        assert_eq!(pipeline.name, "cross-aarch64-linux-gnu");
        assert_eq!(pipeline.env.get("LINUX_ARCH").map(String::as_str), Some("arm64"));

        let root = std::path::Path::new("/nonexistent-root");
        let result = PipelineValidator::validate(&pipeline, root).unwrap();
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(!result.warnings.iter().any(|w| w.contains("not fetched")));
    }

    #[test]
    fn test_template_bootstrap_order() {
        let pipeline = Pipeline::from_yaml(&generate_toolchain_template("riscv64-linux-gnu")).unwrap();
        let plan = PipelinePlan::from_pipeline(&pipeline, std::path::Path::new("/tc"), ArtifactFetcher::new()).unwrap();
        let order = plan.dag().unwrap().execution_order_names().unwrap();

        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("fetch-binutils") < pos("binutils-src"));
        assert!(pos("binutils") < pos("linux-headers"));
        assert!(pos("linux-headers") < pos("gcc-stage1"));
        assert!(pos("gcc-stage1") < pos("libc"));
        assert!(pos("libc") < pos("gcc-final"));
        assert_eq!(order.last().map(String::as_str), Some("gcc-final"));
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite_without_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".crossflow.yaml");
        std::fs::write(&path, "name: mine\nstages: []\n").unwrap();

        assert!(run(&path, "aarch64-linux-gnu".into(), false, false).await.is_err());
        assert!(std::fs::read_to_string(&path).unwrap().contains("mine"));

        run(&path, "aarch64-linux-gnu".into(), true, false).await.unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("cross-aarch64-linux-gnu"));
    }
}
