//! Shell steps that fetch a challenge bundle into the sandbox and run it.
//!
//! Both workload variants execute the same steps: the container variant joins
//! them into one `bash -c` script, the VM variant emits them as cloud-init
//! `runcmd` entries. In challenge mode the compose project runs in the
//! foreground so the workload exits when the challenge does. In test mode the
//! challenge is started detached, the candidate solution is built and run
//! against it, and the flag it writes is posted to the verification endpoint.
//! Every test-mode step before that POST may fail without stopping the script,
//! so verification always runs and always removes the test namespace.

use crate::naming::InstanceMode;

pub const HTTP_PORT: i32 = 8080;
pub const SSH_PORT: i32 = 8022;

/// Directory shared with the docker daemon holding the unpacked bundles
pub const CODE_DIR: &str = "/run/challenge";

/// Directory shared with the docker daemon where the solution drops its flag
pub const FLAG_DIR: &str = "/run/flag";

/// File the solution image must write the captured flag to, relative to `/flag`
pub const FLAG_FILE: &str = "flag.txt";

#[derive(Clone, Debug)]
pub struct ScriptParams<'a> {
    pub backend_url: &'a str,
    pub challenge_id: &'a str,
    pub token: &'a str,
    pub domain: &'a str,
    pub mode: InstanceMode,
    pub insecure_tls: bool,
}

impl ScriptParams<'_> {
    fn wget(&self) -> &'static str {
        if self.insecure_tls {
            "wget -q --no-check-certificate"
        } else {
            "wget -q"
        }
    }

    fn backend(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    fn download(&self, route: &str, file: &str) -> Vec<String> {
        vec![
            format!(
                r#"{} -O "{dir}/{file}.zip" "{}/{route}/{}/download?token={}""#,
                self.wget(),
                self.backend(),
                self.challenge_id,
                self.token,
                dir = CODE_DIR,
            ),
            format!(
                r#"unzip -o -d "{dir}/{file}/" "{dir}/{file}.zip""#,
                dir = CODE_DIR
            ),
        ]
    }
}

/// Environment every workload receives, in `KEY=value` order
pub fn environment(domain: &str) -> Vec<(&'static str, String)> {
    vec![
        ("HTTP_PORT", HTTP_PORT.to_string()),
        ("SSH_PORT", SSH_PORT.to_string()),
        ("DOMAIN", domain.to_string()),
    ]
}

/// Generate the init steps for one instance
pub fn steps(params: &ScriptParams<'_>) -> Vec<String> {
    let compose = format!(r#"docker compose -f "{}/challenge/compose.yaml""#, CODE_DIR);
    let exports: Vec<String> = environment(params.domain)
        .into_iter()
        .map(|(k, v)| format!(r#"{}="{}""#, k, v))
        .collect();

    let mut steps = vec![
        format!("export {}", exports.join(" ")),
        format!("mkdir -p {} {}", CODE_DIR, FLAG_DIR),
        "until docker info >/dev/null 2>&1; do sleep 1; done".to_string(),
    ];
    steps.extend(params.download("challenges", "challenge"));

    match params.mode {
        InstanceMode::Challenge => {
            steps.push(format!("{} up --build", compose));
        }
        InstanceMode::Test => {
            steps.extend(params.download("solutions", "solution"));
            steps.push(format!("{} up -d --build", compose));
            steps.push(format!(r#"docker build -t solution "{}/solution""#, CODE_DIR));
            steps.push(format!(
                r#"docker run --rm --network host -e HTTP_PORT -e SSH_PORT -e DOMAIN -v "{}:/flag" solution"#,
                FLAG_DIR
            ));
            steps.push(format!(
                r#"FLAG="$(tr -d '\r\n' < "{}/{}")""#,
                FLAG_DIR, FLAG_FILE
            ));

            // A broken solution must still reach the POST, with an empty flag if need be
            steps = steps.into_iter().map(tolerate_failure).collect();
            steps.push(ESCAPE_FLAG.to_string());
            steps.push(format!(
                r#"{} -O - --header "Content-Type: application/json" --post-data "{{\"flag\": \"$FLAG\"}}" "{}/solutions/{}/verify""#,
                params.wget(),
                params.backend(),
                params.challenge_id,
            ));
        }
    }

    steps
}

/// Escape `\` and `"` in `$FLAG` so it can be embedded in a JSON string
const ESCAPE_FLAG: &str = r#"FLAG="$(printf '%s' "$FLAG" | sed -e 's/\\/\\\\/g' -e 's/"/\\"/g')""#;

fn tolerate_failure(step: String) -> String {
    format!("{} || true", step)
}

/// Join steps into a single fail-fast shell script
pub fn script(steps: &[String]) -> String {
    let mut script = String::from("set -e\n");
    script.push_str(&steps.join("\n"));
    script.push('\n');
    script
}
