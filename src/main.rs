use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use trainload::config::AppConfig;
use trainload::database::Database;
use trainload::import::SessionImporter;
use trainload::logging::init_logging;
use trainload::zones::{format_pace, ZoneTable};
use trainload::{
    AthleteThresholds, CompositeScore, EfficiencyTrend, PmcResponse, ProjectedLoad, Session,
    SessionRepository, Sport, TrainLoadError, TrainingLoadEngine, TrendDirection,
    TsbInterpretation, ZoneSet,
};

/// Training load analytics: TSS, fitness/fatigue/form, zones and composite scores
#[derive(Parser)]
#[command(name = "trainload")]
#[command(version)]
#[command(about = "Training load analytics CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import sessions from a CSV file
    Import {
        /// Input file path
        #[arg(short, long)]
        file: PathBuf,

        /// Athlete the sessions belong to
        #[arg(short, long)]
        athlete: Option<String>,
    },

    /// Show or update an athlete's thresholds
    Thresholds {
        #[arg(short, long)]
        athlete: Option<String>,

        /// Functional threshold power (watts)
        #[arg(long)]
        ftp: Option<u16>,

        /// Lactate threshold heart rate (bpm)
        #[arg(long)]
        lthr: Option<u16>,

        /// Threshold running speed (m/s)
        #[arg(long)]
        threshold_pace: Option<Decimal>,

        /// Critical swim speed (m/s)
        #[arg(long)]
        css: Option<Decimal>,

        #[arg(long)]
        max_hr: Option<u16>,

        #[arg(long)]
        resting_hr: Option<u16>,
    },

    /// Training zones from current thresholds
    Zones {
        #[arg(short, long)]
        athlete: Option<String>,
    },

    /// TSS for a hypothetical session against current thresholds
    Tss {
        #[arg(short, long)]
        athlete: Option<String>,

        #[arg(short, long)]
        sport: Sport,

        /// Duration in seconds
        #[arg(short, long)]
        duration: u32,

        /// Distance in meters
        #[arg(long)]
        distance: Option<Decimal>,

        #[arg(long)]
        hr: Option<u16>,

        #[arg(long)]
        power: Option<u16>,

        #[arg(long)]
        np: Option<u16>,
    },

    /// Performance Management Chart with a forward projection
    Pmc {
        #[arg(short, long)]
        athlete: Option<String>,

        /// History window in days
        #[arg(short, long, default_value = "42")]
        days: u32,

        /// Evaluate as of this date (YYYY-MM-DD), default today
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Project a constant daily TSS instead of rest
        #[arg(long)]
        plan_tss: Option<Decimal>,
    },

    /// Per-sport composite scores and balance
    Triscore {
        #[arg(short, long)]
        athlete: Option<String>,

        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Efficiency Factor trend for one sport
    Efficiency {
        #[arg(short, long)]
        athlete: Option<String>,

        #[arg(short, long)]
        sport: Sport,

        #[arg(short, long, default_value = "90")]
        days: u32,

        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

#[derive(Tabled)]
struct PmcRow {
    #[tabled(rename = "Date")]
    date: NaiveDate,
    #[tabled(rename = "TSS")]
    tss: Decimal,
    #[tabled(rename = "CTL")]
    ctl: Decimal,
    #[tabled(rename = "ATL")]
    atl: Decimal,
    #[tabled(rename = "TSB")]
    tsb: Decimal,
    #[tabled(rename = "Ramp")]
    ramp: String,
}

#[derive(Tabled)]
struct ZoneRow {
    #[tabled(rename = "Zone")]
    zone: u8,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Range")]
    range: String,
}

#[derive(Tabled)]
struct SportRow {
    #[tabled(rename = "Sport")]
    sport: String,
    #[tabled(rename = "Score")]
    score: Decimal,
    #[tabled(rename = "Trend")]
    trend: String,
    #[tabled(rename = "Hours")]
    hours: Decimal,
    #[tabled(rename = "TSS")]
    tss: Decimal,
    #[tabled(rename = "Sessions")]
    sessions: u32,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        match e.downcast_ref::<TrainLoadError>() {
            Some(err) => eprintln!("{} {}", "Error:".red().bold(), err.user_message()),
            None => eprintln!("{} {:#}", "Error:".red().bold(), e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(),
    };

    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    init_logging(&log_config)?;

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    let database = Database::new(&db_path).map_err(TrainLoadError::from)?;
    let engine = TrainingLoadEngine::new(database, config.engine_options())?;

    let athlete = |requested: Option<String>| -> Result<String> {
        match requested.or_else(|| config.settings.default_athlete_id.clone()) {
            Some(id) => Ok(id),
            None => bail!("No athlete given; pass --athlete or set settings.default_athlete_id"),
        }
    };
    let today = |date: Option<NaiveDate>| date.unwrap_or_else(|| Local::now().date_naive());

    match cli.command {
        Commands::Import { file, athlete: who } => {
            let athlete_id = athlete(who)?;
            let sessions = SessionImporter::new()
                .import_file(&file, &athlete_id)
                .map_err(TrainLoadError::from)?;
            let count = engine.record_sessions(sessions)?;
            println!(
                "{}",
                format!("✓ Imported {} sessions for {}", count, athlete_id).green()
            );
        }

        Commands::Thresholds {
            athlete: who,
            ftp,
            lthr,
            threshold_pace,
            css,
            max_hr,
            resting_hr,
        } => {
            let athlete_id = athlete(who)?;
            let current = match engine.repository().thresholds(&athlete_id) {
                Ok(thresholds) => thresholds,
                Err(trainload::repository::RepositoryError::AthleteNotFound(_)) => {
                    AthleteThresholds::default()
                }
                Err(e) => return Err(TrainLoadError::from(e).into()),
            };
            let updated = AthleteThresholds {
                ftp: ftp.or(current.ftp),
                lthr: lthr.or(current.lthr),
                threshold_pace: threshold_pace.or(current.threshold_pace),
                css: css.or(current.css),
                max_hr: max_hr.or(current.max_hr),
                resting_hr: resting_hr.or(current.resting_hr),
            };

            if updated != current {
                let recomputed = engine.update_thresholds(&athlete_id, &updated)?;
                eprintln!(
                    "{}",
                    format!("✓ Thresholds saved, {} sessions recomputed", recomputed).green()
                );
            }
            print_value(cli.json, &updated, print_thresholds)?;
        }

        Commands::Zones { athlete: who } => {
            let zones = engine.zones_for(&athlete(who)?)?;
            print_value(cli.json, &zones, print_zones)?;
        }

        Commands::Tss {
            athlete: who,
            sport,
            duration,
            distance,
            hr,
            power,
            np,
        } => {
            let athlete_id = athlete(who)?;
            let thresholds = engine.repository().thresholds(&athlete_id).unwrap_or_default();
            let mut session = Session::new("preview", athlete_id, today(None), sport, duration);
            session.distance = distance;
            session.avg_heart_rate = hr;
            session.avg_power = power;
            session.normalized_power = np;

            let result = engine.compute_session_tss(&session, &thresholds);
            print_value(cli.json, &result, |r| {
                println!("{} {}", "TSS:".bold(), r.tss);
                if let Some(intensity) = r.intensity_factor {
                    println!("{} {}", "IF: ".bold(), intensity);
                }
                println!("{} {}", "Method:".dimmed(), r.method.as_str());
            })?;
        }

        Commands::Pmc {
            athlete: who,
            days,
            today: as_of,
            plan_tss,
        } => {
            let load = plan_tss.map_or(ProjectedLoad::Rest, ProjectedLoad::Constant);
            let pmc = engine.get_pmc_with_plan(&athlete(who)?, days, today(as_of), &load)?;
            print_value(cli.json, &pmc, print_pmc)?;
        }

        Commands::Triscore {
            athlete: who,
            today: as_of,
        } => {
            let score = engine.get_tri_score(&athlete(who)?, today(as_of))?;
            print_value(cli.json, &score, print_tri_score)?;
        }

        Commands::Efficiency {
            athlete: who,
            sport,
            days,
            today: as_of,
        } => {
            let trend = engine.get_efficiency_trend(&athlete(who)?, sport, days, today(as_of))?;
            print_value(cli.json, &trend, print_efficiency)?;
        }
    }

    Ok(())
}

fn print_value<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_thresholds(thresholds: &AthleteThresholds) {
    let show = |value: Option<String>| value.unwrap_or_else(|| "-".dimmed().to_string());
    println!("{}", "Thresholds".bold());
    println!("  FTP:            {}", show(thresholds.ftp.map(|v| format!("{} W", v))));
    println!("  LTHR:           {}", show(thresholds.lthr.map(|v| format!("{} bpm", v))));
    println!(
        "  Threshold pace: {}",
        show(thresholds.threshold_pace.map(|v| format!("{} /km", format_pace(Decimal::from(1000), v))))
    );
    println!(
        "  CSS:            {}",
        show(thresholds.css.map(|v| format!("{} /100m", format_pace(Decimal::from(100), v))))
    );
    println!("  Max HR:         {}", show(thresholds.max_hr.map(|v| v.to_string())));
    println!("  Resting HR:     {}", show(thresholds.resting_hr.map(|v| v.to_string())));
}

fn print_zones(zones: &ZoneSet) {
    let tables = [
        ("Heart rate", &zones.heart_rate),
        ("Power", &zones.power),
        ("Run pace", &zones.pace),
        ("Swim pace", &zones.swim),
    ];
    for (title, table) in tables {
        match table {
            Some(table) => {
                println!("{}", title.bold());
                println!("{}", zone_table(table));
            }
            None => println!("{} {}", title.bold(), "(threshold not set)".dimmed()),
        }
    }
}

fn zone_table(table: &ZoneTable) -> String {
    let rows: Vec<ZoneRow> = table
        .zones
        .iter()
        .map(|z| ZoneRow {
            zone: z.zone,
            name: z.name.clone(),
            range: z.description.clone(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

fn print_pmc(pmc: &PmcResponse) {
    let Some(current) = &pmc.current else {
        println!("{}", "No sessions yet".yellow());
        return;
    };

    let rows: Vec<PmcRow> = pmc
        .history
        .iter()
        .map(|p| PmcRow {
            date: p.date,
            tss: p.tss,
            ctl: p.ctl,
            atl: p.atl,
            tsb: p.tsb,
            ramp: p.ramp_rate.map_or_else(|| "-".to_string(), |r| r.to_string()),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    let form = TsbInterpretation::from_tsb(current.tsb);
    println!(
        "{} CTL {}  ATL {}  TSB {}  {}",
        "Today:".bold(),
        current.ctl.to_string().cyan(),
        current.atl.to_string().magenta(),
        current.tsb.to_string().yellow(),
        form.description().dimmed()
    );

    if let (Some(first), Some(last)) = (pmc.projections.first(), pmc.projections.last()) {
        println!(
            "{} {} → {}: CTL {}  TSB {}",
            "Projection".bold(),
            first.date,
            last.date,
            last.ctl,
            last.tsb
        );
    }
}

fn print_tri_score(score: &CompositeScore) {
    let rows: Vec<SportRow> = score
        .sports
        .iter()
        .map(|s| SportRow {
            sport: s.sport.label().to_string(),
            score: s.score,
            trend: format!("{:+}", s.trend),
            hours: s.weekly_hours,
            tss: s.weekly_tss,
            sessions: s.activity_count,
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    println!("{} {}", "Overall:".bold(), score.overall.to_string().cyan().bold());

    if score.balance.balanced {
        println!("{} {}", "Balance:".bold(), score.balance.balance_score.to_string().green());
    } else {
        println!("{} {}", "Balance:".bold(), score.balance.balance_score.to_string().yellow());
    }
    for recommendation in &score.balance.recommendations {
        println!("  • {}", recommendation);
    }
}

fn print_efficiency(trend: &EfficiencyTrend) {
    if trend.points.is_empty() {
        println!("{}", format!("No qualifying {} sessions", trend.sport).yellow());
        return;
    }

    let direction = match trend.trend_direction {
        TrendDirection::Improving => "improving".green(),
        TrendDirection::Declining => "declining".red(),
        TrendDirection::Stable => "stable".normal(),
    };
    println!(
        "{} {} sessions, average EF {}",
        trend.sport.label().bold(),
        trend.points.len(),
        trend.average_ef
    );
    println!("{} {} ({:+.1}%)", "Trend:".bold(), direction, trend.trend_percent);
    if let Some(best) = &trend.best {
        println!("{} {} on {}", "Best:".bold(), best.ef, best.date);
    }
}
