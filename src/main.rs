fn main() {
    order_uploader_lib::run()
}
