#![forbid(unsafe_code)]

//! wssec CLI: run the WS-Security header pass over a SOAP message.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use wssec::find_security_header;
use wssec_core::Error;
use wssec_crypto::AlgorithmRegistry;
use wssec_keys::{loader, PrivateKeyEntry, X509Certificate};
use wssec_processor::{
    CertificateStore, LocalKeyTarget, MimePart, ProcessingPass, ProcessorConfig,
    ProcessorContext, ProcessorResult, ShardedKeyCache, Token,
};
use wssec_xml::{Document, NodeId};

#[derive(Parser)]
#[command(
    name = "wssec",
    about = "WS-Security message processing (signature verification, decryption)",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the security header and summarize what it proved
    Process {
        /// Input SOAP message
        file: PathBuf,

        #[command(flatten)]
        pass: PassArgs,
    },

    /// Process the security header and write the decrypted message
    Decrypt {
        /// Input SOAP message
        file: PathBuf,

        #[command(flatten)]
        pass: PassArgs,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List supported algorithms
    Info,
}

#[derive(Args)]
struct PassArgs {
    /// Trusted X.509 certificate for key references (PEM or DER, repeatable)
    #[arg(long)]
    cert: Vec<PathBuf>,

    /// RSA private key for encrypted keys (PEM or DER, repeatable).
    /// Certificates in the same PEM file form its chain.
    #[arg(short = 'k', long)]
    key: Vec<PathBuf>,

    /// Certificate the sender is known to sign with
    #[arg(long = "sender-cert")]
    sender_cert: Option<PathBuf>,

    /// MIME attachment for cid: references (CONTENT-ID=FILE)
    #[arg(long)]
    part: Vec<String>,

    /// Register additional ID attribute names
    #[arg(long = "id-attr")]
    id_attr: Vec<String>,

    /// Accept signing certificates outside their validity period
    #[arg(long = "no-cert-validity")]
    no_cert_validity: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Process { pass, .. } | Commands::Decrypt { pass, .. } => pass.verbose,
        Commands::Info => false,
    };
    init_tracing(verbose);

    let result = match cli.command {
        Commands::Process { file, pass } => cmd_process(file, pass),
        Commands::Decrypt { file, pass, output } => cmd_decrypt(file, pass, output),
        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "wssec=debug,wssec_processor=debug"
    } else {
        "wssec=info,wssec_processor=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_process(file: PathBuf, args: PassArgs) -> Result<(), Error> {
    let (doc, result) = run_pass(&file, &args)?;
    print_summary(&doc, &result, &args.id_attr);
    Ok(())
}

fn cmd_decrypt(file: PathBuf, args: PassArgs, output: Option<PathBuf>) -> Result<(), Error> {
    let (doc, result) = run_pass(&file, &args)?;
    if result.encrypted_elements().is_empty() {
        eprintln!("No encrypted content was recovered");
    }
    write_output(output, doc.to_string().as_bytes())
}

/// Parse `file`, run the whole-header pass and return the processed document.
fn run_pass(file: &Path, args: &PassArgs) -> Result<(Document, ProcessorResult), Error> {
    let ctx = build_context(args)?;
    let xml = read_file(file)?;
    let doc = Document::parse(&xml)?;
    let header = find_security_header(&doc)
        .ok_or_else(|| Error::MissingElement("wsse:Security header".into()))?;

    debug!(file = %file.display(), "processing security header");

    let mut pass = ProcessingPass::new(doc, &ctx).map_err(processing)?;
    if let Some(path) = &args.sender_cert {
        pass = pass.with_sender_certificate(loader::load_certificate_file(path)?);
    }
    let parts = load_parts(&args.part)?;
    if !parts.is_empty() {
        pass = pass.with_parts(parts);
    }
    pass.process_security_header(header).map_err(processing)?;
    pass.finish().map_err(processing)
}

fn build_context(args: &PassArgs) -> Result<ProcessorContext, Error> {
    let mut certificates = Vec::new();
    for path in &args.cert {
        certificates.push(loader::load_certificate_file(path)?);
    }

    let mut entries = Vec::new();
    for path in &args.key {
        entries.push(load_key_entry(path, &certificates)?);
    }

    let config = ProcessorConfig {
        check_signing_cert_validity: !args.no_cert_validity,
        id_attributes: args.id_attr.clone(),
        ..ProcessorConfig::default()
    };

    Ok(ProcessorContext::new(config)
        .with_certificate_resolver(Arc::new(CertificateStore::new(certificates)))
        .with_key_target(Arc::new(LocalKeyTarget::new(entries)))
        .with_key_cache(Arc::new(ShardedKeyCache::new())))
}

/// Load a private key. Its chain is the certificates in the same PEM file,
/// or else the first trusted certificate the key belongs to.
fn load_key_entry(path: &Path, trusted: &[X509Certificate]) -> Result<PrivateKeyEntry, Error> {
    let data = std::fs::read(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))?;
    let pem = data.windows(11).any(|w| w == b"-----BEGIN ");
    let key = if pem {
        loader::load_rsa_private_key_pem(&data)?
    } else {
        loader::load_rsa_private_key_der(&data)?
    };

    let chain = if pem {
        loader::load_certificates_pem(&data)?
    } else {
        Vec::new()
    };
    if !chain.is_empty() {
        return loader::load_private_key_entry(path, chain);
    }

    let bare = PrivateKeyEntry::new(key.clone(), Vec::new());
    let chain = trusted
        .iter()
        .find(|c| bare.matches_certificate(c))
        .cloned()
        .into_iter()
        .collect::<Vec<_>>();
    if chain.is_empty() {
        warn!(
            key = %path.display(),
            "no certificate for private key, it only serves EncryptedKeys without KeyInfo"
        );
    }
    Ok(PrivateKeyEntry::new(key, chain))
}

fn load_parts(specs: &[String]) -> Result<Vec<MimePart>, Error> {
    let mut parts = Vec::new();
    for spec in specs {
        let Some((cid, file)) = spec.split_once('=') else {
            return Err(Error::Other(format!(
                "invalid part format: {spec} (expected CONTENT-ID=FILE)"
            )));
        };
        let body =
            std::fs::read(file).map_err(|e| Error::Other(format!("{file}: {e}")))?;
        parts.push(MimePart::new(cid, body));
    }
    Ok(parts)
}

fn processing(e: wssec_processor::ProcessingError) -> Error {
    Error::Other(e.to_string())
}

// ── Output ───────────────────────────────────────────────────────────

fn print_summary(doc: &Document, result: &ProcessorResult, id_attrs: &[String]) {
    let describe = |el: NodeId| {
        let name = doc.local_name(el);
        match doc.element_id(el, id_attrs) {
            Some(id) => format!("{name} (#{id})"),
            None => name.to_owned(),
        }
    };

    println!("Tokens:");
    for (i, token) in result.tokens().iter().enumerate() {
        let detail = match token {
            Token::X509(x) => format!("{} [{:?}]", x.certificate().subject(), x.origin()),
            Token::WrappedKey(k) if k.is_unwrapped() => "unwrapped".to_owned(),
            Token::WrappedKey(_) => "not for this recipient".to_owned(),
            Token::SecurityContext(c) => c.context_id().to_owned(),
        };
        let id = token.element_id().unwrap_or("-");
        println!("  [{i}] {} {id}: {detail}", token.kind());
    }

    println!("Signed elements:");
    for signed in result.signed_elements() {
        println!(
            "  {} by token [{}] ({})",
            describe(signed.element),
            signed.signing_token.index(),
            signed.signature_algorithm
        );
    }
    for part in result.signed_parts() {
        println!("  cid:{} by token [{}]", part.content_id, part.signing_token.index());
    }

    println!("Encrypted elements:");
    for encrypted in result.encrypted_elements() {
        println!("  {} ({})", describe(encrypted.element), encrypted.algorithm);
    }

    match result.timestamp() {
        Some(ts) => {
            let show = |t: Option<DateTime<Utc>>| {
                t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_owned())
            };
            println!(
                "Timestamp: created {} expires {}{}",
                show(ts.created),
                show(ts.expires),
                if ts.is_signed() { " (signed)" } else { "" }
            );
        }
        None => println!("Timestamp: none"),
    }

    for confirmation in result.signature_confirmations() {
        println!("SignatureConfirmation: {}", confirmation.value);
    }
    if result.encryption_ignored() {
        println!("Some encrypted keys were addressed to another recipient");
    }
    debug!(
        security_ns = result.security_ns().unwrap_or("-"),
        wsu_ns = result.wsu_ns().unwrap_or("-"),
        key_transport = result.last_key_encryption_algorithm().unwrap_or("-"),
        wsse11 = result.wsse11_seen(),
        "diagnostics"
    );
}

fn cmd_info() -> Result<(), Error> {
    println!("wssec - WS-Security message processor");
    for (purpose, uris) in AlgorithmRegistry::supported() {
        println!();
        println!("Supported {purpose} algorithms:");
        for uri in uris {
            println!("  {uri}");
        }
    }
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::Other(format!("{}: {e}", path.display())))
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Error> {
    match path {
        Some(p) => std::fs::write(&p, data).map_err(|e| Error::Other(format!("{}: {e}", p.display()))),
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(data)
                .map_err(|e| Error::Other(format!("stdout: {e}")))
        }
    }
}
