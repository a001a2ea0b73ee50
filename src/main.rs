fn main() {
    interview_proctor_lib::run()
}
