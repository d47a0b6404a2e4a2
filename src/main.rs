fn main() {
    market_scout_lib::run()
}
