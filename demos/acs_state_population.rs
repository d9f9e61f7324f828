use anyhow::Result;
use censusapi::{Census, DataResponse, Shape};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure the key via CENSUS_API_KEY or a `.censusapirc` file.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut census = Census::from_env()?;

    census.set_year(2020)?;
    census.set_api("acs")?;
    census.set_database("acs5")?;
    census.set_table("profile")?;
    census.set_concepts(&["ACS DEMOGRAPHIC AND HOUSING ESTIMATES"])?;
    census.add_variable("NAME")?;
    census.add_variable("DP05_0001E")?;
    census.set_geography("state")?;
    census.add_geography_value("01")?;
    census.add_geography_value("02")?;

    match census.pull_data(Shape::Labelled)? {
        DataResponse::Table(table) => println!("{}", serde_json::to_string_pretty(&table)?),
        DataResponse::Rows(rows) => println!("{:?}", rows),
        DataResponse::Raw(body) => println!("{}", body),
    }
    Ok(())
}
