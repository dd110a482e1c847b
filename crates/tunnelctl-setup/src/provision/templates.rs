use crate::ssh::ScriptPayload;

use super::preflight::Arch;
use super::{RELAY_CONFIG_PATH, RELAY_SERVICE};

/// Relay server release installed on the remote host.
pub const RELAY_VERSION: &str = "0.66.0";

/// Download proxies tried before the origin, in order.
pub const MIRROR_PREFIXES: [&str; 3] = [
    "https://ghfast.top/",
    "https://gh-proxy.com/",
    "https://ghproxy.cn/",
];

/// sed program printing the token value of an `auth.token = "..."` line.
pub const TOKEN_SED: &str = r#"s/^auth\.token *= *"\(.*\)"$/\1/p"#;

/// Release archive base name for `arch`.
pub fn artifact_name(arch: Arch) -> String {
    format!("frp_{RELAY_VERSION}_linux_{}", arch.artifact())
}

/// Canonical download location of the release archive.
pub fn origin_url(arch: Arch) -> String {
    format!(
        "https://github.com/fatedier/frp/releases/download/v{RELAY_VERSION}/{}.tar.gz",
        artifact_name(arch)
    )
}

/// Every download candidate: each mirror prefix over the origin, then the
/// origin itself.
pub fn download_urls(arch: Arch) -> Vec<String> {
    let origin = origin_url(arch);
    MIRROR_PREFIXES
        .iter()
        .map(|prefix| format!("{prefix}{origin}"))
        .chain(std::iter::once(origin.clone()))
        .collect()
}

/// systemd unit for the relay server.
pub fn systemd_unit() -> String {
    format!(
        r"[Unit]
Description=frps relay server (tunnelctl)
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart=/usr/local/bin/frps -c {RELAY_CONFIG_PATH}
Restart=always
RestartSec=5

[Install]
WantedBy=multi-user.target
"
    )
}

/// The install script: download with mirror fallback, install the binary,
/// keep or create the auth token, write the config, and enable the service.
///
/// Safe to re-run: an existing token in the remote config is reused.
pub fn install_script(bind_port: u16, arch: Arch) -> ScriptPayload {
    let urls = download_urls(arch)
        .iter()
        .map(|u| format!("\"{u}\""))
        .collect::<Vec<_>>()
        .join(" \\\n    ");
    let artifact = artifact_name(arch);
    let unit = systemd_unit();

    ScriptPayload::new(format!(
        r#"set -eu
BIND_PORT={bind_port}
ARTIFACT="{artifact}"
CONFIG_FILE="{RELAY_CONFIG_PATH}"

TMP_DIR=$(mktemp -d)
trap 'rm -rf "$TMP_DIR"' EXIT

downloaded=""
for url in {urls}; do
    echo "[INFO] downloading $url"
    if curl -fsSL --connect-timeout 10 -o "$TMP_DIR/$ARTIFACT.tar.gz" "$url"; then
        downloaded=1
        break
    fi
    echo "[WARN] download failed, trying next source"
done
if [ -z "$downloaded" ]; then
    echo "[ERROR] all download sources failed" >&2
    exit 1
fi

tar -xzf "$TMP_DIR/$ARTIFACT.tar.gz" -C "$TMP_DIR"
install -m 755 "$TMP_DIR/$ARTIFACT/frps" /usr/local/bin/frps
echo "[INFO] installed /usr/local/bin/frps"

TOKEN=""
if [ -f "$CONFIG_FILE" ]; then
    TOKEN=$(sed -n '{TOKEN_SED}' "$CONFIG_FILE" | head -n 1)
fi
if [ -z "$TOKEN" ]; then
    TOKEN=$(od -An -tx1 -N16 /dev/urandom | tr -d ' \n')
    echo "[INFO] generated new auth token"
else
    echo "[INFO] keeping existing auth token"
fi

mkdir -p "$(dirname "$CONFIG_FILE")"
umask 077
cat > "$CONFIG_FILE" <<EOF
bindPort = $BIND_PORT
auth.token = "$TOKEN"
EOF
chmod 600 "$CONFIG_FILE"

cat > /etc/systemd/system/{RELAY_SERVICE}.service <<'EOF'
{unit}EOF

command -v systemctl >/dev/null
systemctl daemon-reload
systemctl enable --now {RELAY_SERVICE}
echo "[INFO] {RELAY_SERVICE} started on port $BIND_PORT"
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_come_before_origin() {
        let urls = download_urls(Arch::Aarch64);
        assert_eq!(urls.len(), 4);
        assert!(urls[0].starts_with("https://ghfast.top/https://github.com/"));
        assert!(urls[2].starts_with("https://ghproxy.cn/"));
        assert_eq!(
            urls[3],
            "https://github.com/fatedier/frp/releases/download/v0.66.0/frp_0.66.0_linux_arm64.tar.gz"
        );
    }

    #[test]
    fn script_carries_port_artifact_and_trailing_exit() {
        let script = install_script(7001, Arch::X86_64);
        let text = script.as_str();
        assert!(text.starts_with("set -eu\n"));
        assert!(text.contains("BIND_PORT=7001"));
        assert!(text.contains("ARTIFACT=\"frp_0.66.0_linux_amd64\""));
        assert!(text.contains("systemctl enable --now frps"));
        assert!(text.contains("Restart=always"));
        assert!(text.ends_with("exit $?\n"));
    }

    #[test]
    fn script_reuses_token_and_avoids_xxd() {
        let text = install_script(7000, Arch::Armv7).as_str().to_string();
        assert!(text.contains("if [ -f \"$CONFIG_FILE\" ]; then"));
        assert!(text.contains("od -An -tx1 -N16 /dev/urandom"));
        assert!(!text.contains("xxd"));
    }

    #[test]
    fn unit_points_at_remote_config() {
        assert!(systemd_unit().contains("ExecStart=/usr/local/bin/frps -c /etc/frps/frps.toml"));
    }
}
