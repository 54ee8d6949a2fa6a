use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use thumbforge::catalog::CatalogStore;
use thumbforge::config::{self, AppConfig, WorkspacePaths};
use thumbforge::pipeline::{Pipeline, RecordUpdate};
use thumbforge::publish::{
    self, GraphPublisher, PostRequest, PublishContext, ScheduleRules, parse_schedule,
};
use thumbforge::render::{ChromeRenderer, TimedRenderer};
use thumbforge::rows::{
    self, BADGE, IMAGE_URL, MAIN_TITLE, ManualColumns, RowData, SUB_TITLE, highlight_title,
};
use thumbforge::settings::SettingsStore;
use thumbforge::template::{self, DirTemplateStore, TemplateStore};
use thumbforge::{bulk::TextEdit, output};
use tracing_subscriber::EnvFilter;

/// Name the stock template is written under by `templates init`.
const STOCK_TEMPLATE_NAME: &str = "default.html";

#[derive(Parser)]
#[command(name = "thumbforge")]
#[command(about = "Render marketing thumbnails from HTML templates")]
#[command(long_about = "\
Render marketing thumbnails from HTML templates

Rows of text become PNG thumbnails: each row is substituted into an HTML
template and screenshotted by headless Chrome. A JSON catalog tracks every
thumbnail so it can be edited, re-rendered, or published later.

Workspace structure:

  workspace/
  ├── config.toml          # Optional, see 'thumbforge gen-config'
  ├── db.json              # Catalog of thumbnails and the saved library
  ├── settings.json        # Saved image URLs and publishing credentials
  ├── templates/           # *.html templates with {{ key }} placeholders
  ├── generated/           # Rendered thumbnails (one PNG per record)
  ├── uploads/             # Images attached with 'edit --image-file'
  └── csv/                 # CSV files rewritten by 'respin-csv'

Template placeholders:
  {{ badge }}  {{ main_title | safe }}  {{ sub_title }}  {{ image_url }}

Set RUST_LOG (e.g. RUST_LOG=thumbforge=debug) for more detail on stderr.")]
#[command(version)]
struct Cli {
    /// Workspace directory (holds config.toml)
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Text fields shared by commands that set row values.
#[derive(clap::Args, Clone, Default)]
struct FieldArgs {
    #[arg(long)]
    badge: Option<String>,
    /// Main title; combine with --highlight to mark the product name
    #[arg(long)]
    title: Option<String>,
    /// Word of the title to highlight
    #[arg(long, requires = "title")]
    highlight: Option<String>,
    #[arg(long)]
    sub_title: Option<String>,
    #[arg(long)]
    image_url: Option<String>,
}

impl FieldArgs {
    fn into_row(self) -> RowData {
        let mut data = RowData::new();
        if let Some(badge) = self.badge {
            data.insert(BADGE.to_string(), badge);
        }
        if let Some(title) = self.title {
            let word = self.highlight.unwrap_or_default();
            data.insert(MAIN_TITLE.to_string(), highlight_title(&title, &word));
        }
        if let Some(sub_title) = self.sub_title {
            data.insert(SUB_TITLE.to_string(), sub_title);
        }
        if let Some(url) = self.image_url {
            data.insert(IMAGE_URL.to_string(), url);
        }
        data
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create one thumbnail per row of a CSV file
    Import {
        csv: PathBuf,
        #[arg(long, short)]
        template: String,
    },
    /// Create thumbnails from hand-entered columns (repeat each flag per row)
    Manual {
        #[arg(long, short)]
        template: String,
        #[arg(long = "badge")]
        badges: Vec<String>,
        #[arg(long = "title")]
        titles: Vec<String>,
        #[arg(long = "highlight")]
        highlights: Vec<String>,
        #[arg(long = "sub-title")]
        sub_titles: Vec<String>,
        #[arg(long = "image-url")]
        image_urls: Vec<String>,
    },
    /// List thumbnails, newest first
    List,
    /// Show every field of one thumbnail
    Show { id: String },
    /// Change fields of a thumbnail and re-render it
    Edit {
        id: String,
        #[arg(long, short)]
        template: Option<String>,
        #[command(flatten)]
        fields: FieldArgs,
        /// Local image to attach as the thumbnail's image_url
        #[arg(long)]
        image_file: Option<PathBuf>,
    },
    /// Re-render one thumbnail with another template
    Swap { id: String, template: String },
    /// Delete a thumbnail and its file
    Delete { id: String },
    /// Delete every thumbnail in the working set
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Re-render every thumbnail with another template
    BulkSwap { template: String },
    /// Replace text on every thumbnail
    BulkText {
        #[arg(long)]
        badge: Option<String>,
        /// New title; {product_name} stands for the highlighted name
        #[arg(long)]
        title_format: Option<String>,
        #[arg(long)]
        sub_title: Option<String>,
    },
    /// Give thumbnails a random image from the saved URL list
    Spin {
        /// Only this thumbnail
        #[arg(long)]
        id: Option<String>,
    },
    /// Manage the saved library
    #[command(subcommand)]
    Library(LibraryCommand),
    /// Manage the saved image URL list
    #[command(subcommand)]
    Images(ImagesCommand),
    /// Store Facebook publishing credentials
    Credentials {
        #[arg(long)]
        access_token: Option<String>,
        #[arg(long)]
        page_id: Option<String>,
    },
    /// Manage HTML templates
    #[command(subcommand)]
    Templates(TemplatesCommand),
    /// Post a thumbnail to the Facebook page
    Publish {
        id: String,
        #[arg(long, default_value = "")]
        caption: String,
        /// First comment posted under the post
        #[arg(long)]
        comment: Option<String>,
        /// "now" or "YYYY-MM-DD HH:MM" at the configured offset
        #[arg(long)]
        schedule: Option<String>,
        /// Post this file instead of the rendered thumbnail
        #[arg(long)]
        media: Option<PathBuf>,
    },
    /// Copy every rendered thumbnail into a directory
    Export { dest: PathBuf },
    /// Compare the catalog with the files on disk
    Verify,
    /// Rewrite the image column of every CSV with random saved URLs
    RespinCsv {
        /// Directory of CSV files (default: paths.csv_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum LibraryCommand {
    /// Copy a thumbnail's record into the library
    Save { id: String },
    /// Remove a record from the library
    Remove { id: String },
    /// List library records
    List,
}

#[derive(Subcommand)]
enum ImagesCommand {
    /// Replace the saved list (one URL per argument or per line of --file)
    Set {
        urls: Vec<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    List,
}

#[derive(Subcommand)]
enum TemplatesCommand {
    List,
    /// Print a template's HTML
    Show { name: String },
    /// Store an HTML file as a template
    Save { name: String, file: PathBuf },
    /// Write the stock starter template
    Init,
}

/// Everything a command needs, resolved from `--root`.
struct Workspace {
    config: AppConfig,
    paths: WorkspacePaths,
    templates: DirTemplateStore,
    store: CatalogStore,
    settings: SettingsStore,
}

impl Workspace {
    fn open(root: &Path) -> Result<Self, config::ConfigError> {
        let config = config::load_config(root)?;
        let paths = config.resolve_paths(root);
        Ok(Self {
            templates: DirTemplateStore::new(&paths.templates),
            store: CatalogStore::new(&paths.catalog),
            settings: SettingsStore::new(&paths.settings),
            config,
            paths,
        })
    }

    fn engine(&self) -> TimedRenderer<ChromeRenderer> {
        let timeout = self.config.render.timeout();
        let chrome_path = self.config.render.chrome_path.as_ref().map(PathBuf::from);
        TimedRenderer::new(ChromeRenderer::new(chrome_path, timeout), timeout)
    }

    fn pipeline<'a>(
        &'a self,
        engine: &'a TimedRenderer<ChromeRenderer>,
    ) -> Pipeline<'a, DirTemplateStore, TimedRenderer<ChromeRenderer>> {
        Pipeline::new(
            &self.templates,
            engine,
            &self.store,
            &self.paths.generated,
            &self.paths.uploads,
        )
        .with_viewport(self.config.render.viewport())
        .with_base_url(self.config.render.base_url.clone())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("thumbforge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let ws = Workspace::open(&cli.root)?;
    let engine = ws.engine();
    let pipeline = ws.pipeline(&engine);

    match cli.command {
        Command::Import { csv, template } => {
            let rows = rows::read_csv(&csv)?;
            let report = pipeline.create_batch(rows, &template)?;
            output::print_batch_report(&report);
        }
        Command::Manual {
            template,
            badges,
            titles,
            highlights,
            sub_titles,
            image_urls,
        } => {
            let columns = ManualColumns {
                badges: badges.join("\n"),
                main_titles: titles.join("\n"),
                highlight_words: highlights.join("\n"),
                sub_titles: sub_titles.join("\n"),
                image_urls: image_urls.join("\n"),
            };
            let rows = rows::assemble_manual(&columns)?;
            let report = pipeline.create_batch(rows, &template)?;
            output::print_batch_report(&report);
        }
        Command::List => {
            output::print_records(&pipeline.list()?);
        }
        Command::Show { id } => {
            output::print_record_detail(&pipeline.get(&id)?);
        }
        Command::Edit {
            id,
            template,
            fields,
            image_file,
        } => {
            let update = RecordUpdate {
                template,
                fields: fields.into_row(),
                image_file,
            };
            let record = pipeline.refresh(&id, update)?;
            output::print_record_detail(&record);
        }
        Command::Swap { id, template } => {
            let record = pipeline.swap_template(&id, &template)?;
            output::print_records(std::slice::from_ref(&record));
        }
        Command::Delete { id } => {
            output::print_lines(output::format_delete(&pipeline.delete(&id)?));
        }
        Command::Clear { yes } => {
            if !yes {
                println!("Refusing to clear without --yes");
                return Ok(());
            }
            output::print_lines(output::format_clear(&pipeline.clear()?));
        }
        Command::BulkSwap { template } => {
            output::print_bulk_report(&pipeline.swap_all_templates(&template)?);
        }
        Command::BulkText {
            badge,
            title_format,
            sub_title,
        } => {
            let edit = TextEdit {
                badge,
                main_title_format: title_format,
                sub_title,
            };
            output::print_bulk_report(&pipeline.edit_all_text(&edit)?);
        }
        Command::Spin { id } => {
            let urls = ws.settings.load()?.image_urls;
            let mut rng = StdRng::from_entropy();
            match id {
                Some(id) => {
                    let record = pipeline.spin_one(&id, &urls, &mut rng)?;
                    output::print_records(std::slice::from_ref(&record));
                }
                None => output::print_bulk_report(&pipeline.spin_all(&urls, &mut rng)?),
            }
        }
        Command::Library(LibraryCommand::Save { id }) => {
            if pipeline.save_to_library(&id)? {
                println!("Saved {id} to the library");
            } else {
                println!("{id} is already in the library");
            }
        }
        Command::Library(LibraryCommand::Remove { id }) => {
            if pipeline.remove_from_library(&id)? {
                println!("Removed {id} from the library");
            } else {
                println!("{id} is not in the library");
            }
        }
        Command::Library(LibraryCommand::List) => {
            output::print_records(&pipeline.library()?);
        }
        Command::Images(ImagesCommand::Set { urls, file }) => {
            let mut text = urls.join("\n");
            if let Some(file) = file {
                text.push('\n');
                text.push_str(&std::fs::read_to_string(file)?);
            }
            let mut settings = ws.settings.load()?;
            settings.set_image_urls(&text);
            ws.settings.save(&settings)?;
            println!("Saved {} image URLs", settings.image_urls.len());
        }
        Command::Images(ImagesCommand::List) => {
            output::print_lines(output::format_image_urls(&ws.settings.load()?.image_urls));
        }
        Command::Credentials {
            access_token,
            page_id,
        } => {
            let mut settings = ws.settings.load()?;
            if access_token.is_some() {
                settings.credentials.facebook_access_token = access_token;
            }
            if page_id.is_some() {
                settings.credentials.facebook_page_id = page_id;
            }
            ws.settings.save(&settings)?;
            let state = if settings.credentials.facebook().is_some() {
                "complete"
            } else {
                "incomplete"
            };
            println!("Credentials saved ({state})");
        }
        Command::Templates(TemplatesCommand::List) => {
            let names = ws.templates.list_templates()?;
            output::print_lines(output::format_templates(&names, ws.templates.root()));
        }
        Command::Templates(TemplatesCommand::Show { name }) => {
            print!("{}", ws.templates.read(&name)?);
        }
        Command::Templates(TemplatesCommand::Save { name, file }) => {
            let text = std::fs::read_to_string(file)?;
            let stored = ws.templates.write(&name, &text)?;
            println!("Saved template {stored}");
        }
        Command::Templates(TemplatesCommand::Init) => {
            if ws.templates.exists(STOCK_TEMPLATE_NAME) {
                println!("{STOCK_TEMPLATE_NAME} already exists");
            } else {
                let stored = ws
                    .templates
                    .write(STOCK_TEMPLATE_NAME, &template::stock_template())?;
                println!("Wrote {}", ws.templates.root().join(stored).display());
            }
        }
        Command::Publish {
            id,
            caption,
            comment,
            schedule,
            media,
        } => {
            let settings = ws.settings.load()?;
            let catalog = ws.store.load()?;
            let rules = ScheduleRules::from_config(&ws.config.publish)?;
            let request = PostRequest {
                record_id: id,
                caption,
                first_comment: comment,
                schedule: parse_schedule(schedule.as_deref())?,
                custom_media: media,
            };
            let ctx = PublishContext {
                credentials: &settings.credentials,
                catalog: &catalog,
                generated_dir: &ws.paths.generated,
                rules,
                now: chrono::Utc::now(),
            };
            let publisher = GraphPublisher::new(&ws.config.publish)?;
            let receipt = publish::publish_record(&publisher, &request, &ctx)?;
            output::print_lines(output::format_receipt(&receipt, rules.offset));
        }
        Command::Export { dest } => {
            let count = pipeline.export(&dest)?;
            println!("Exported {count} thumbnails to {}", dest.display());
        }
        Command::Verify => {
            output::print_inconsistencies(&pipeline.verify()?);
        }
        Command::RespinCsv { dir } => {
            let dir = dir.unwrap_or_else(|| ws.paths.csv_dir.clone());
            let urls = ws.settings.load()?.image_urls;
            let mut rng = StdRng::from_entropy();
            let outcomes = rows::respin_csv_dir(&dir, &urls, &mut rng)?;
            output::print_lines(output::format_respin(&outcomes));
        }
        // printed before the workspace is opened
        Command::GenConfig => {}
    }

    Ok(())
}
