type DynError = Box<dyn std::error::Error>;
type DynResult<T> = core::result::Result<T, DynError>;

fn main() -> DynResult<()> {
    println!("cargo:rerun-if-changed=src/substitution.pest");
    println!("cargo:rerun-if-changed=src/batch.pest");
    println!("cargo:rerun-if-changed=src/inf.pest");
    Ok(())
}
